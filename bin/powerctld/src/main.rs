//! ---
//! pc_section: "05-daemon"
//! pc_subsection: "binary"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Binary entrypoint for the powerctl daemon."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use powerctl_common::config::AppConfig;
use powerctl_common::logging::init_tracing;
use powerctl_common::LoggingConfig;
use powerctl_core::{
    DryRunExecutor, PlatformSupport, PowerCommandExecutor, PowerController, SystemCommandExecutor,
};
use powerctl_lifecycle::{cancel_on_os_signal, ShutdownOutcome, Supervisor, SupervisorSettings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod service;

const SERVICE_BINARY: &str = "powerctld";
const CONFIG_FILE_NAME: &str = "powerctl.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "Remote power control daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, help = "Log power commands instead of executing them")]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Without a subcommand the daemon runs under the service manager when it was
/// started by one and in the foreground otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    #[command(about = "Serve in the foreground until interrupted")]
    Run,
    #[command(about = "Run under the host service manager")]
    Service,
}

/// Who started the process. Decides how relative log paths resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Launch {
    Console,
    ServiceManager,
}

/// Resolved configuration, carried until the launch mode is known.
#[derive(Debug, Clone)]
pub(crate) struct Startup {
    config: AppConfig,
    source: Option<PathBuf>,
    dry_run: bool,
}

impl Startup {
    /// Initialise logging for `launch` and build the power controller.
    pub(crate) fn prepare(mut self, launch: Launch) -> Result<(AppConfig, PowerController)> {
        if launch == Launch::ServiceManager {
            // Service managers start processes with an unrelated working directory.
            anchor_log_directory(&mut self.config.logging, executable_dir().as_deref());
        }
        init_tracing(SERVICE_BINARY, &self.config.logging)?;
        match &self.source {
            Some(path) => info!(config_path = %path.display(), ?launch, "configuration loaded"),
            None => info!(?launch, "no configuration file found; using defaults"),
        }
        let controller = build_controller(&self.config, self.dry_run);
        Ok((self.config, controller))
    }

    #[cfg(windows)]
    pub(crate) fn service_name(&self) -> &str {
        &self.config.service.name
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = AppConfig::load_with_source(&config_candidates(cli.config.as_deref()))?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    config.validate()?;

    let startup = Startup {
        config,
        source: loaded.source,
        dry_run: cli.dry_run,
    };
    match cli.command {
        Some(Commands::Run) => run_foreground(startup),
        Some(Commands::Service) => service::run(startup),
        None => service::run_or_foreground(startup),
    }
}

fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Some(dir) = executable_dir() {
        candidates.push(dir.join(CONFIG_FILE_NAME));
    }
    candidates
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn anchor_log_directory(logging: &mut LoggingConfig, base: Option<&Path>) {
    if let Some(base) = base {
        if logging.directory.is_relative() {
            logging.directory = base.join(&logging.directory);
        }
    }
}

pub(crate) fn build_controller(config: &AppConfig, dry_run: bool) -> PowerController {
    if dry_run {
        warn!("dry-run mode: power commands are logged, never executed");
        return PowerController::new(Arc::new(DryRunExecutor), PlatformSupport::Supported);
    }

    let platform = PlatformSupport::detect();
    if !platform.is_supported() {
        warn!("power commands are unavailable on this host; actions will answer 501");
    }
    let executor: Arc<dyn PowerCommandExecutor> =
        Arc::new(SystemCommandExecutor::new(config.command.program.clone()));
    PowerController::new(executor, platform)
}

pub(crate) fn supervisor_for(config: &AppConfig) -> Supervisor {
    Supervisor::new(SupervisorSettings::new(
        config.server.listen,
        config.server.grace_period,
    ))
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("powerctld-worker")
        .build()
        .context("failed to build tokio runtime")
}

pub(crate) fn run_foreground(startup: Startup) -> Result<()> {
    let (config, controller) = startup.prepare(Launch::Console)?;
    let runtime = build_runtime()?;
    let supervisor = supervisor_for(&config);
    let router = powerctl_api::router(controller);

    let outcome = runtime.block_on(async move {
        let handle = supervisor.spawn(router).await?;
        let cancel = CancellationToken::new();

        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = cancel_on_os_signal(signal_token.clone()).await {
                error!(error = %err, "signal listener failed; stopping");
                signal_token.cancel();
            }
        });

        handle.run_until_cancelled(cancel).await
    })?;

    match outcome {
        ShutdownOutcome::Clean => info!("powerctld stopped"),
        ShutdownOutcome::TimedOut => warn!("powerctld stopped after forcing open connections closed"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommand_is_optional() {
        let cli = Cli::try_parse_from(["powerctld"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(!cli.dry_run);

        let cli = Cli::try_parse_from([
            "powerctld",
            "--listen",
            "127.0.0.1:9000",
            "--dry-run",
            "service",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Service));
        assert_eq!(cli.listen, Some("127.0.0.1:9000".parse().unwrap()));
        assert!(cli.dry_run);
    }

    #[test]
    fn explicit_config_is_tried_first() {
        let candidates = config_candidates(Some(Path::new("/etc/powerctl/custom.toml")));
        assert_eq!(candidates[0], PathBuf::from("/etc/powerctl/custom.toml"));
        assert_eq!(candidates[1], PathBuf::from(CONFIG_FILE_NAME));
    }

    #[test]
    fn relative_log_directory_is_anchored() {
        let base = tempfile::tempdir().unwrap();
        let mut logging = LoggingConfig::default();
        anchor_log_directory(&mut logging, Some(base.path()));
        assert_eq!(logging.directory, base.path().join("logs"));

        let absolute = base.path().join("elsewhere");
        logging.directory = absolute.clone();
        anchor_log_directory(&mut logging, Some(base.path()));
        assert_eq!(logging.directory, absolute);
    }

    #[tokio::test]
    async fn dry_run_controller_accepts_actions_on_any_host() {
        let controller = build_controller(&AppConfig::default(), true);
        assert!(controller.platform().is_supported());
        let result = controller
            .perform(powerctl_core::PowerActionKind::Restart, br#"{"delaySeconds":5}"#)
            .await;
        assert!(result.success);
        assert_eq!(result.http_status, 200);
    }
}
