//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Executor doubles for tests."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
//! Executor doubles shared by the test suites of dependent crates. Enabled
//! with the `test-support` feature.
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::executor::{CommandError, PowerCommandExecutor};

/// Canned result returned by [`RecordingExecutor`].
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    /// Fail as if the program could not be launched.
    SpawnFailure(io::ErrorKind, String),
    /// Fail as if the program exited with the given status text.
    ExitFailure(String),
}

/// Records every invocation and answers with a scripted outcome.
#[derive(Debug)]
pub struct RecordingExecutor {
    program: String,
    outcome: ScriptedOutcome,
    latency: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
    started: Notify,
}

impl RecordingExecutor {
    pub fn new(outcome: ScriptedOutcome) -> Self {
        Self {
            program: "shutdown".to_owned(),
            outcome,
            latency: None,
            calls: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(ScriptedOutcome::Succeed)
    }

    pub fn failing_to_spawn(message: impl Into<String>) -> Self {
        Self::new(ScriptedOutcome::SpawnFailure(
            io::ErrorKind::NotFound,
            message.into(),
        ))
    }

    /// Hold every invocation for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Argument lists of all invocations so far, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Resolves once an invocation has started.
    pub async fn started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl PowerCommandExecutor for RecordingExecutor {
    async fn execute(&self, args: &[String]) -> Result<(), CommandError> {
        self.calls.lock().push(args.to_vec());
        self.started.notify_one();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match &self.outcome {
            ScriptedOutcome::Succeed => Ok(()),
            ScriptedOutcome::SpawnFailure(kind, message) => Err(CommandError::Spawn {
                program: self.program.clone(),
                args: args.to_vec(),
                source: io::Error::new(*kind, message.clone()),
            }),
            ScriptedOutcome::ExitFailure(status) => Err(CommandError::Exit {
                program: self.program.clone(),
                args: args.to_vec(),
                status: status.clone(),
            }),
        }
    }
}
