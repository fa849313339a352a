//! ---
//! pc_section: "04-lifecycle"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Service-manager control protocol for supervised runs."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
//! Supervised mode. The host service manager talks to the process through two
//! channels: control requests flow in, status reports flow out. The concrete
//! binding (e.g. the Windows service control dispatcher) only has to forward
//! requests through a [`ControlSender`] and implement [`StatusReporter`].
use std::io;

use axum::Router;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::state::LifecycleState;
use crate::supervisor::{ShutdownOutcome, Supervisor};

/// Service exit code reported when the listener could not be bound.
pub const STARTUP_FAILURE_EXIT_CODE: u32 = 1;
/// Service exit code reported when the server failed while running.
pub const RUNTIME_FAILURE_EXIT_CODE: u32 = 2;

/// Control message sent by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Report the current status; must not change anything.
    Interrogate,
    Stop,
    /// The host is shutting down.
    Shutdown,
}

/// Sending half of the control channel, held by the service-manager callback.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlRequest>,
}

impl ControlSender {
    /// Forward `request` to [`run_supervised`]. Returns `false` once the
    /// service loop has ended; the late request is only logged.
    pub fn send(&self, request: ControlRequest) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(_) => {
                debug!(?request, "control request arrived after the service loop ended");
                false
            }
        }
    }
}

/// Channel connecting the service-manager callback to [`run_supervised`].
pub fn control_channel() -> (ControlSender, mpsc::UnboundedReceiver<ControlRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, rx)
}

/// Status report sent back to the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: LifecycleState,
    /// Whether Stop/Shutdown requests are accepted in this state.
    pub accepts_stop: bool,
    pub exit_code: u32,
}

impl ServiceStatus {
    pub fn for_state(state: LifecycleState) -> Self {
        Self {
            state,
            accepts_stop: matches!(
                state,
                LifecycleState::Running | LifecycleState::StopPending
            ),
            exit_code: 0,
        }
    }

    pub fn stopped(exit_code: u32) -> Self {
        Self {
            exit_code,
            ..Self::for_state(LifecycleState::Stopped)
        }
    }
}

/// Sink for status reports.
pub trait StatusReporter {
    fn report(&self, status: ServiceStatus) -> io::Result<()>;
}

impl StatusReporter for mpsc::UnboundedSender<ServiceStatus> {
    fn report(&self, status: ServiceStatus) -> io::Result<()> {
        self.send(status)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "status channel closed"))
    }
}

fn report<R: StatusReporter + ?Sized>(reporter: &R, status: ServiceStatus) {
    if let Err(err) = reporter.report(status) {
        warn!(state = %status.state, error = %err, "failed to report service status");
    }
}

/// Run the control surface under a service manager.
///
/// Reports `Starting`, then `Running` once bound. Interrogation is answered
/// with the current state. Stop and Shutdown (or a closed control channel)
/// cancel the server, are acknowledged with `StopPending` and confirmed with
/// `Stopped` once the supervisor has finished.
pub async fn run_supervised<R: StatusReporter + ?Sized>(
    supervisor: Supervisor,
    router: Router,
    mut controls: mpsc::UnboundedReceiver<ControlRequest>,
    reporter: &R,
) -> Result<ShutdownOutcome, LifecycleError> {
    let mut watch = supervisor.watch();
    report(reporter, ServiceStatus::for_state(LifecycleState::Starting));

    let handle = match supervisor.spawn(router).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(error = %err, "service failed to start");
            report(reporter, ServiceStatus::stopped(STARTUP_FAILURE_EXIT_CODE));
            return Err(err);
        }
    };
    report(reporter, ServiceStatus::for_state(LifecycleState::Running));

    let cancel = CancellationToken::new();
    let mut running = tokio::spawn(handle.run_until_cancelled(cancel.clone()));

    loop {
        tokio::select! {
            joined = &mut running => {
                let result = flatten(joined);
                report(reporter, stopped_status(&result));
                return result;
            }
            request = controls.recv() => match request {
                Some(ControlRequest::Interrogate) => {
                    report(reporter, ServiceStatus::for_state(watch.current()));
                }
                Some(ControlRequest::Stop) | Some(ControlRequest::Shutdown) | None => {
                    match request {
                        Some(request) => info!(?request, "stop requested by service manager"),
                        None => info!("service control channel closed; stopping"),
                    }
                    cancel.cancel();
                    watch.reached(LifecycleState::StopPending).await;
                    report(reporter, ServiceStatus::for_state(LifecycleState::StopPending));

                    let result = flatten(running.await);
                    report(reporter, stopped_status(&result));
                    return result;
                }
            }
        }
    }
}

fn flatten(
    joined: Result<Result<ShutdownOutcome, LifecycleError>, JoinError>,
) -> Result<ShutdownOutcome, LifecycleError> {
    joined.map_err(LifecycleError::Join)?
}

fn stopped_status(result: &Result<ShutdownOutcome, LifecycleError>) -> ServiceStatus {
    match result {
        Ok(_) => ServiceStatus::stopped(0),
        Err(_) => ServiceStatus::stopped(RUNTIME_FAILURE_EXIT_CODE),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::routing::get;

    use super::*;
    use crate::supervisor::SupervisorSettings;

    fn supervisor_on(addr: SocketAddr) -> Supervisor {
        Supervisor::new(SupervisorSettings::new(addr, Duration::from_secs(1)))
    }

    fn router() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServiceStatus>) -> Vec<ServiceStatus> {
        let mut statuses = Vec::new();
        while let Ok(status) = rx.try_recv() {
            statuses.push(status);
        }
        statuses
    }

    #[tokio::test]
    async fn interrogate_then_stop() {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        control_tx.send(ControlRequest::Interrogate).unwrap();
        control_tx.send(ControlRequest::Stop).unwrap();

        let outcome = run_supervised(
            supervisor_on("127.0.0.1:0".parse().unwrap()),
            router(),
            control_rx,
            &status_tx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, ShutdownOutcome::Clean);

        let states: Vec<_> = drain(&mut status_rx)
            .into_iter()
            .map(|status| status.state)
            .collect();
        assert_eq!(
            states,
            [
                LifecycleState::Starting,
                LifecycleState::Running,
                LifecycleState::Running,
                LifecycleState::StopPending,
                LifecycleState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_acknowledges_before_confirming() {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        let service = tokio::spawn(async move {
            run_supervised(
                supervisor_on("127.0.0.1:0".parse().unwrap()),
                router(),
                control_rx,
                &status_tx,
            )
            .await
        });

        assert_eq!(
            status_rx.recv().await.unwrap(),
            ServiceStatus::for_state(LifecycleState::Starting)
        );
        let running = status_rx.recv().await.unwrap();
        assert_eq!(running.state, LifecycleState::Running);
        assert!(running.accepts_stop);

        control_tx.send(ControlRequest::Shutdown).unwrap();
        let pending = status_rx.recv().await.unwrap();
        assert_eq!(pending.state, LifecycleState::StopPending);
        let stopped = status_rx.recv().await.unwrap();
        assert_eq!(stopped, ServiceStatus::stopped(0));
        assert!(!stopped.accepts_stop);

        service.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_reports_stopped_with_exit_code() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let (_control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        let err = run_supervised(
            supervisor_on(occupied.local_addr().unwrap()),
            router(),
            control_rx,
            &status_tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LifecycleError::StartupFailed { .. }));

        let statuses = drain(&mut status_rx);
        assert_eq!(
            statuses,
            [
                ServiceStatus::for_state(LifecycleState::Starting),
                ServiceStatus::stopped(STARTUP_FAILURE_EXIT_CODE),
            ]
        );
    }

    #[test]
    fn late_control_requests_are_dropped() {
        let (controls, control_rx) = control_channel();
        assert!(controls.send(ControlRequest::Interrogate));
        drop(control_rx);
        assert!(!controls.send(ControlRequest::Stop));
        assert!(!controls.clone().send(ControlRequest::Shutdown));
    }

    #[tokio::test]
    async fn closed_control_channel_stops_service() {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        drop(control_tx);

        run_supervised(
            supervisor_on("127.0.0.1:0".parse().unwrap()),
            router(),
            control_rx,
            &status_tx,
        )
        .await
        .unwrap();
        let last = drain(&mut status_rx).pop().unwrap();
        assert_eq!(last, ServiceStatus::stopped(0));
    }
}
