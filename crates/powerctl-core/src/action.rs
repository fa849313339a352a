//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Power action data model."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::fmt;

use crate::delay::{parse_delay, DelaySeconds};
use crate::error::PowerActionError;

/// Power action exposed through the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerActionKind {
    Shutdown,
    Restart,
    /// Reboot and ask UEFI firmware to open its setup screen on the next boot.
    RestartToFirmware,
}

impl PowerActionKind {
    pub const ALL: [PowerActionKind; 3] = [
        PowerActionKind::Shutdown,
        PowerActionKind::Restart,
        PowerActionKind::RestartToFirmware,
    ];

    /// Route under which the action is served.
    pub fn path(self) -> &'static str {
        match self {
            PowerActionKind::Shutdown => "/shutdown",
            PowerActionKind::Restart => "/restart",
            PowerActionKind::RestartToFirmware => "/restart-bios",
        }
    }

    /// Message returned when the platform utility accepted the command.
    pub fn success_message(self) -> &'static str {
        match self {
            PowerActionKind::Shutdown => "Shutdown command staged. The machine is powering off.",
            PowerActionKind::Restart => "Restart command staged. The machine is restarting.",
            PowerActionKind::RestartToFirmware => {
                "Firmware restart command staged. The machine will reboot into BIOS/UEFI."
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PowerActionKind::Shutdown => "shutdown",
            PowerActionKind::Restart => "restart",
            PowerActionKind::RestartToFirmware => "restart-to-firmware",
        }
    }
}

impl fmt::Display for PowerActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated request to perform a power action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerActionRequest {
    pub kind: PowerActionKind,
    pub delay: DelaySeconds,
}

impl PowerActionRequest {
    pub fn new(kind: PowerActionKind, delay: DelaySeconds) -> Self {
        Self { kind, delay }
    }

    /// Build a request from a raw HTTP body. See [`parse_delay`].
    pub fn from_body(kind: PowerActionKind, body: &[u8]) -> Result<Self, PowerActionError> {
        Ok(Self::new(kind, parse_delay(body)?))
    }

    /// Success message, restating the delay when one was requested.
    pub fn success_message(&self) -> String {
        let base = self.kind.success_message();
        if self.delay.is_zero() {
            base.to_owned()
        } else {
            format!("{base} It will run in {}.", self.delay)
        }
    }
}

/// Outcome of a single power action request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerActionResult {
    pub success: bool,
    pub http_status: u16,
    pub message: String,
}

impl PowerActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            http_status: 200,
            message: message.into(),
        }
    }

    pub fn from_error(err: &PowerActionError) -> Self {
        Self {
            success: false,
            http_status: err.status_code(),
            message: err.public_message(),
        }
    }
}
