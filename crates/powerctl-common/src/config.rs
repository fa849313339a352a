//! ---
//! pc_section: "01-core-functionality"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Configuration model and loading for the powerctl daemon."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Port the control surface listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8181;

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_program() -> String {
    "shutdown".to_owned()
}

fn default_service_name() -> String {
    "WindowsControl".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the powerctl daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and the built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "POWERCTL_CONFIG";

    /// Load configuration together with the effective source path.
    ///
    /// The `POWERCTL_CONFIG` override wins over the candidate list. When no
    /// candidate exists the defaults are returned, since a bare listen address is
    /// all the daemon strictly needs.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        let env_override = std::env::var(Self::ENV_CONFIG_PATH).ok();
        Self::resolve(env_override.as_deref(), candidates)
    }

    fn resolve<P: AsRef<Path>>(
        env_override: Option<&str>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Some(env_path) = env_override.filter(|path| !path.trim().is_empty()) {
            let path = PathBuf::from(env_path);
            let config = Self::from_path(&path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path),
            });
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.is_file() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.server.grace_period.is_zero() {
            return Err(anyhow!("server.grace_period_ms must be greater than zero"));
        }
        if self.command.program.trim().is_empty() {
            return Err(anyhow!("command.program must not be empty"));
        }
        if self.service.name.trim().is_empty() {
            return Err(anyhow!("service.name must not be empty"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Listener and shutdown settings handed to the lifecycle supervisor.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(rename = "grace_period_ms", default = "default_grace_period")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            grace_period: default_grace_period(),
        }
    }
}

/// Platform power utility invoked by the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandConfig {
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

/// Name registered with the host service manager in supervised mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
