//! ---
//! pc_section: "04-lifecycle"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Start, drain and stop of the HTTP control surface."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::state::{LifecycleState, StateCell, StateWatch};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Listener address and drain budget for a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub listen: SocketAddr,
    /// How long in-flight requests may run after cancellation before their
    /// connections are closed.
    pub grace_period: Duration,
}

impl SupervisorSettings {
    pub fn new(listen: SocketAddr, grace_period: Duration) -> Self {
        Self {
            listen,
            grace_period,
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::new(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8181)),
            Duration::from_secs(5),
        )
    }
}

/// How the server went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection finished inside the grace period.
    Clean,
    /// The grace period ran out and the remaining connections were closed.
    TimedOut,
}

/// Owns the lifecycle state and drives the server through it.
#[derive(Debug)]
pub struct Supervisor {
    settings: SupervisorSettings,
    state: StateCell,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            state: StateCell::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    pub fn watch(&self) -> StateWatch {
        self.state.watch()
    }

    /// Bind the listener and start serving `router`.
    ///
    /// On bind failure the state never leaves [`LifecycleState::Starting`].
    pub async fn spawn(self, router: Router) -> Result<SupervisorHandle, LifecycleError> {
        let addr = self.settings.listen;
        let startup_failed = |source: std::io::Error| LifecycleError::StartupFailed { addr, source };
        let listener = TcpListener::bind(addr).await.map_err(startup_failed)?;
        let local_addr = listener.local_addr().map_err(startup_failed)?;

        let drain = CancellationToken::new();
        let force = CancellationToken::new();
        let server = tokio::spawn(accept_loop(listener, router, drain.clone(), force.clone()));

        self.state.advance(LifecycleState::Running);
        info!(address = %local_addr, "control surface listening");

        Ok(SupervisorHandle {
            settings: self.settings,
            state: self.state,
            local_addr,
            server,
            drain,
            force,
        })
    }

    /// Convenience for [`Supervisor::spawn`] followed by
    /// [`SupervisorHandle::run_until_cancelled`].
    pub async fn run(
        self,
        router: Router,
        cancel: CancellationToken,
    ) -> Result<ShutdownOutcome, LifecycleError> {
        self.spawn(router).await?.run_until_cancelled(cancel).await
    }
}

/// Accepts connections until `drain` fires, then waits for the open ones to
/// finish. Once `force` fires every connection task still alive is aborted,
/// which drops its socket without a response.
async fn accept_loop(
    listener: TcpListener,
    router: Router,
    drain: CancellationToken,
    force: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = drain.cancelled() => break,
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "connection task failed");
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, router.clone(), drain.clone()));
                }
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
    drop(listener);
    debug!(open = connections.len(), "listener closed; draining connections");

    let forced = tokio::select! {
        _ = join_all(&mut connections) => false,
        _ = force.cancelled() => true,
    };
    if forced {
        let open = connections.len();
        connections.shutdown().await;
        warn!(closed = open, "open connections force-closed");
    }
}

async fn join_all(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    drain: CancellationToken,
) {
    let connection = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = drain.cancelled() => {
            // Finishes the request in progress, then closes instead of keeping alive.
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(err) = result {
        debug!(%peer, error = %err, "connection closed with error");
    }
}

/// A running server. Dropping the handle leaves the server task running.
#[derive(Debug)]
pub struct SupervisorHandle {
    settings: SupervisorSettings,
    state: StateCell,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
    drain: CancellationToken,
    force: CancellationToken,
}

impl SupervisorHandle {
    /// Address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    pub fn watch(&self) -> StateWatch {
        self.state.watch()
    }

    /// Serve until `cancel` fires, then drain within the grace period.
    ///
    /// Connections still open at the deadline are closed before the state
    /// moves to [`LifecycleState::Stopped`]. Power commands already launched
    /// by those requests are not interrupted.
    pub async fn run_until_cancelled(
        mut self,
        cancel: CancellationToken,
    ) -> Result<ShutdownOutcome, LifecycleError> {
        tokio::select! {
            _ = cancel.cancelled() => {}
            joined = &mut self.server => {
                self.state.advance(LifecycleState::Stopped);
                warn!("control surface exited without a cancellation request");
                return joined
                    .map(|()| ShutdownOutcome::Clean)
                    .map_err(LifecycleError::Join);
            }
        }

        let grace_period = self.settings.grace_period;
        info!(
            grace_period_ms = grace_period.as_millis() as u64,
            "cancellation received; draining control surface"
        );
        self.state.advance(LifecycleState::StopPending);
        self.drain.cancel();

        let result = match tokio::time::timeout(grace_period, &mut self.server).await {
            Ok(joined) => joined
                .map(|()| ShutdownOutcome::Clean)
                .map_err(LifecycleError::Join),
            Err(_) => {
                warn!(
                    grace_period_ms = grace_period.as_millis() as u64,
                    "graceful shutdown timed out; forcing connections closed"
                );
                self.force.cancel();
                (&mut self.server)
                    .await
                    .map(|()| ShutdownOutcome::TimedOut)
                    .map_err(LifecycleError::Join)
            }
        };

        self.state.advance(LifecycleState::Stopped);
        match &result {
            Ok(outcome) => info!(?outcome, "control surface stopped"),
            Err(err) => warn!(error = %err, "control surface stopped with error"),
        }
        result
    }
}
