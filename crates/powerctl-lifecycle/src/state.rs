//! ---
//! pc_section: "04-lifecycle"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Lifecycle state machine shared between supervisor and interrogation."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::fmt;

use tokio::sync::watch;
use tracing::debug;

/// Process-wide server state. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Starting,
    Running,
    StopPending,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::StopPending => "stop-pending",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Write side of the state. Exactly one exists per supervisor.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<LifecycleState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Starting);
        Self { tx }
    }

    /// Move forward to `next`. Returns `false` when `next` is not ahead of the
    /// current state, in which case nothing changes.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        let mut previous = None;
        let changed = self.tx.send_if_modified(|current| {
            if next > *current {
                previous = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        if let Some(previous) = previous {
            debug!(from = %previous, to = %next, "lifecycle transition");
        }
        changed
    }

    pub(crate) fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> StateWatch {
        StateWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view used to answer interrogation without side effects.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<LifecycleState>,
}

impl StateWatch {
    pub fn current(&self) -> LifecycleState {
        *self.rx.borrow()
    }

    /// Wait until the state is at least `target` and return the state seen.
    ///
    /// If the supervisor goes away first the last published state is returned.
    pub async fn reached(&mut self, target: LifecycleState) -> LifecycleState {
        if let Ok(state) = self.rx.wait_for(|state| *state >= target).await {
            return *state;
        }
        *self.rx.borrow()
    }
}
