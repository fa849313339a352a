//! ---
//! pc_section: "04-lifecycle"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Process-level lifecycle errors."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::io;
use std::net::SocketAddr;

/// Errors that end the supervised process.
///
/// A grace-period overrun is not an error; it surfaces as
/// [`ShutdownOutcome::TimedOut`](crate::ShutdownOutcome::TimedOut).
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The listener could not be bound; nothing was served.
    #[error("failed to bind control listener {addr}: {source}")]
    StartupFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("http server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}
