//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Delay parsing and validation for power action requests."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::fmt;

use serde::Deserialize;

use crate::error::PowerActionError;

/// Largest delay accepted by the Windows `shutdown /t` switch (ten years).
pub const MAX_DELAY_SECONDS: u32 = 315_360_000;

/// Non-negative delay in seconds. Only constructible through validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DelaySeconds(u32);

impl DelaySeconds {
    pub const ZERO: DelaySeconds = DelaySeconds(0);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<i64> for DelaySeconds {
    type Error = PowerActionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(PowerActionError::InvalidDelay(
                "delaySeconds must be zero or positive".to_owned(),
            ));
        }
        match u32::try_from(value) {
            Ok(seconds) if seconds <= MAX_DELAY_SECONDS => Ok(DelaySeconds(seconds)),
            _ => Err(PowerActionError::InvalidDelay(format!(
                "delaySeconds must not exceed {MAX_DELAY_SECONDS}"
            ))),
        }
    }
}

/// Compact rendering such as `45s`, `5m0s` or `1h30m0s`.
impl fmt::Display for DelaySeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        if hours > 0 {
            write!(f, "{hours}h{minutes}m{seconds}s")
        } else if minutes > 0 {
            write!(f, "{minutes}m{seconds}s")
        } else {
            write!(f, "{seconds}s")
        }
    }
}

#[derive(Debug, Deserialize)]
struct DelayPayload {
    #[serde(rename = "delaySeconds", default)]
    delay_seconds: Option<i64>,
}

/// Extract the requested delay from a request body.
///
/// An empty (or whitespace-only) body, `null`, `{}` and `{"delaySeconds": null}`
/// all mean "no delay". Unknown fields are ignored.
pub fn parse_delay(body: &[u8]) -> Result<DelaySeconds, PowerActionError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DelaySeconds::ZERO);
    }
    let payload: Option<DelayPayload> = serde_json::from_slice(body)?;
    let requested = payload
        .and_then(|payload| payload.delay_seconds)
        .unwrap_or_default();
    DelaySeconds::try_from(requested)
}
