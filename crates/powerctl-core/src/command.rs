//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Translation of power actions into platform command arguments."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use crate::action::PowerActionKind;
use crate::delay::DelaySeconds;

pub const POWER_OFF_FLAG: &str = "/s";
pub const REBOOT_FLAG: &str = "/r";
/// Only honoured on UEFI systems; the utility itself rejects it elsewhere.
pub const FIRMWARE_FLAG: &str = "/fw";
pub const DELAY_FLAG: &str = "/t";

/// Flags selecting the action, before the delay is appended.
pub fn base_flags(kind: PowerActionKind) -> &'static [&'static str] {
    match kind {
        PowerActionKind::Shutdown => &[POWER_OFF_FLAG],
        PowerActionKind::Restart => &[REBOOT_FLAG],
        PowerActionKind::RestartToFirmware => &[REBOOT_FLAG, FIRMWARE_FLAG],
    }
}

/// Ordered argument list for the platform shutdown utility.
pub fn translate(kind: PowerActionKind, delay: DelaySeconds) -> Vec<String> {
    let base = base_flags(kind);
    let mut args = Vec::with_capacity(base.len() + 2);
    args.extend(base.iter().map(|flag| (*flag).to_owned()));
    args.push(DELAY_FLAG.to_owned());
    args.push(delay.get().to_string());
    args
}
