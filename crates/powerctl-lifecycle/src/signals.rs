//! ---
//! pc_section: "04-lifecycle"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "OS signal cancellation source for foreground runs."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::LifecycleError;

/// Cancel `token` on the first interrupt/terminate signal.
///
/// Returns early without cancelling if the token is cancelled by another
/// source first.
pub async fn cancel_on_os_signal(token: CancellationToken) -> Result<(), LifecycleError> {
    tokio::select! {
        received = wait_for_os_signal() => {
            let name = received?;
            info!(signal = name, "shutdown signal received");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_os_signal() -> Result<&'static str, LifecycleError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).map_err(LifecycleError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(LifecycleError::Signal)?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(windows)]
async fn wait_for_os_signal() -> Result<&'static str, LifecycleError> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close};

    let mut interrupt = ctrl_c().map_err(LifecycleError::Signal)?;
    let mut brk = ctrl_break().map_err(LifecycleError::Signal)?;
    let mut close = ctrl_close().map_err(LifecycleError::Signal)?;
    tokio::select! {
        _ = interrupt.recv() => Ok("ctrl-c"),
        _ = brk.recv() => Ok("ctrl-break"),
        _ = close.recv() => Ok("ctrl-close"),
    }
}

#[cfg(not(any(unix, windows)))]
async fn wait_for_os_signal() -> Result<&'static str, LifecycleError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(LifecycleError::Signal)?;
    Ok("ctrl-c")
}
