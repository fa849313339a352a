//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Power-action request pipeline."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
//! Validation, translation and execution of host power actions
//! (shutdown, restart, restart-to-firmware).

pub mod action;
pub mod command;
pub mod delay;
pub mod error;
pub mod executor;
pub mod pipeline;
#[cfg(feature = "test-support")]
pub mod testing;

pub use action::{PowerActionKind, PowerActionRequest, PowerActionResult};
pub use command::translate;
pub use delay::{parse_delay, DelaySeconds, MAX_DELAY_SECONDS};
pub use error::PowerActionError;
pub use executor::{CommandError, DryRunExecutor, PowerCommandExecutor, SystemCommandExecutor};
pub use pipeline::{PlatformSupport, PowerController};
