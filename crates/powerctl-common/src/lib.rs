//! ---
//! pc_section: "01-core-functionality"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Shared primitives for the powerctl workspace."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
//! Configuration loading and tracing setup consumed across the powerctl
//! workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, CommandConfig, LoadedAppConfig, LoggingConfig, ServerConfig, ServiceConfig,
    DEFAULT_PORT,
};
pub use logging::{init_tracing, LogFormat};
