//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Execution of the platform power utility."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Failure to run the platform power utility.
///
/// The executor does not try to tell apart missing privileges, unsupported
/// firmware modes or other causes; it only reports that the command failed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        args: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited unsuccessfully ({status})")]
    Exit {
        program: String,
        args: Vec<String>,
        status: String,
    },
}

impl CommandError {
    /// Arguments of the attempted invocation.
    pub fn args(&self) -> &[String] {
        match self {
            CommandError::Spawn { args, .. } | CommandError::Exit { args, .. } => args,
        }
    }

    pub fn program(&self) -> &str {
        match self {
            CommandError::Spawn { program, .. } | CommandError::Exit { program, .. } => program,
        }
    }
}

/// Runs the platform power utility with a translated argument list.
#[async_trait]
pub trait PowerCommandExecutor: Send + Sync + 'static {
    /// Run the command to completion. `Ok` means the utility exited zero.
    async fn execute(&self, args: &[String]) -> Result<(), CommandError>;
}

/// Spawns the real utility (`shutdown` unless configured otherwise).
#[derive(Debug, Clone)]
pub struct SystemCommandExecutor {
    program: String,
}

impl SystemCommandExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for SystemCommandExecutor {
    fn default() -> Self {
        Self::new("shutdown")
    }
}

#[async_trait]
impl PowerCommandExecutor for SystemCommandExecutor {
    async fn execute(&self, args: &[String]) -> Result<(), CommandError> {
        debug!(program = %self.program, ?args, "launching power command");
        // Not killed on drop: once launched the command must run to completion.
        let status = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                args: args.to_vec(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Exit {
                program: self.program.clone(),
                args: args.to_vec(),
                status: status.to_string(),
            })
        }
    }
}

/// Logs the invocation instead of touching the host. Used by `--dry-run`.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl PowerCommandExecutor for DryRunExecutor {
    async fn execute(&self, args: &[String]) -> Result<(), CommandError> {
        info!(?args, "dry run: power command not executed");
        Ok(())
    }
}
