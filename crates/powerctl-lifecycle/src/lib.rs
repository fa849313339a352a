//! ---
//! pc_section: "04-lifecycle"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Lifecycle supervision of the powerctl HTTP surface."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
//! Brings the control surface up, keeps it running and brings it down within
//! a bounded grace period. Cancellation comes from OS signals in foreground
//! runs or from the service manager in supervised runs; both paths feed the
//! same [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod error;
pub mod service;
pub mod signals;
pub mod state;
pub mod supervisor;

pub use error::LifecycleError;
pub use service::{
    control_channel, run_supervised, ControlRequest, ControlSender, ServiceStatus, StatusReporter,
    RUNTIME_FAILURE_EXIT_CODE, STARTUP_FAILURE_EXIT_CODE,
};
pub use signals::cancel_on_os_signal;
pub use state::{LifecycleState, StateWatch};
pub use supervisor::{ShutdownOutcome, Supervisor, SupervisorHandle, SupervisorSettings};
