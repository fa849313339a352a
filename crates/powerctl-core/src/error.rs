//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Error taxonomy for power action requests."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use crate::executor::CommandError;

/// Per-request failures. All of them are recoverable; none affect the process.
#[derive(Debug, thiserror::Error)]
pub enum PowerActionError {
    /// The body was present but could not be decoded.
    #[error("invalid request body: {0}")]
    MalformedRequest(#[from] serde_json::Error),
    /// The body decoded but the delay is out of range.
    #[error("{0}")]
    InvalidDelay(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("Power control commands are available only on Windows hosts.")]
    PlatformUnsupported,
    /// The platform utility could not be launched or exited non-zero. The
    /// display text is deliberately generic; the wrapped error is for logs only.
    #[error("Failed to execute power command.")]
    CommandFailed(#[source] CommandError),
}

impl PowerActionError {
    /// HTTP status communicating the outcome class.
    pub fn status_code(&self) -> u16 {
        match self {
            PowerActionError::MalformedRequest(_) | PowerActionError::InvalidDelay(_) => 400,
            PowerActionError::MethodNotAllowed => 405,
            PowerActionError::CommandFailed(_) => 500,
            PowerActionError::PlatformUnsupported => 501,
        }
    }

    /// Text that is safe to return to the caller.
    pub fn public_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_hides_details() {
        let err = PowerActionError::CommandFailed(CommandError::Exit {
            program: "shutdown".into(),
            args: vec!["/s".into(), "/t".into(), "0".into()],
            status: "exit code: 1190".into(),
        });
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Failed to execute power command.");
        assert!(!err.public_message().contains("1190"));
    }

    #[test]
    fn status_codes_follow_outcome_class() {
        assert_eq!(PowerActionError::InvalidDelay("x".into()).status_code(), 400);
        assert_eq!(PowerActionError::MethodNotAllowed.status_code(), 405);
        assert_eq!(PowerActionError::PlatformUnsupported.status_code(), 501);
        let malformed = serde_json::from_str::<u8>("nope").unwrap_err();
        assert_eq!(PowerActionError::from(malformed).status_code(), 400);
    }
}
