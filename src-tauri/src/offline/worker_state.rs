//! Proxy worker lifecycle: Parsed → Installing → Installed → Activating → Activated.
//! A failed install makes the worker Redundant; a Redundant worker may still
//! take over when a previous installation of the same version is on disk.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "Parsed"),
            WorkerState::Installing => write!(f, "Installing"),
            WorkerState::Installed => write!(f, "Installed"),
            WorkerState::Activating => write!(f, "Activating"),
            WorkerState::Activated => write!(f, "Activated"),
            WorkerState::Redundant => write!(f, "Redundant"),
        }
    }
}

impl WorkerState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (WorkerState::Parsed, WorkerState::Installing)
                | (WorkerState::Installing, WorkerState::Installed)
                | (WorkerState::Installing, WorkerState::Redundant) // shell fetch failed
                | (WorkerState::Installed, WorkerState::Activating)
                | (WorkerState::Activating, WorkerState::Activated)
                | (WorkerState::Redundant, WorkerState::Activated) // previous install takes over
        )
    }

    /// Only an activated worker intercepts fetches.
    pub fn is_controlling(self) -> bool {
        self == WorkerState::Activated
    }
}

/// Thread-safe worker state with a watch channel for subscribers.
pub struct WorkerStateMachine {
    state: RwLock<WorkerState>,
    state_tx: watch::Sender<WorkerState>,
    state_rx: watch::Receiver<WorkerState>,
}

impl WorkerStateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(WorkerState::Parsed);
        Self {
            state: RwLock::new(WorkerState::Parsed),
            state_tx,
            state_rx,
        }
    }

    pub fn current(&self) -> WorkerState {
        *self.state.read()
    }

    /// Attempt a state transition. Returns Ok(new_state) or Err with reason.
    pub fn transition(&self, next: WorkerState) -> Result<WorkerState, String> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {} -> {}", current, next);
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        let _ = self.state_tx.send(next);
        info!(from = %current, to = %next, "worker_transition");
        Ok(next)
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_rx.clone()
    }
}

impl Default for WorkerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_valid() {
        let machine = WorkerStateMachine::new();
        for next in [
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ] {
            assert_eq!(machine.transition(next), Ok(next));
        }
        assert!(machine.current().is_controlling());
    }

    #[test]
    fn cannot_activate_before_install() {
        let machine = WorkerStateMachine::new();
        assert!(machine.transition(WorkerState::Activating).is_err());
        assert_eq!(machine.current(), WorkerState::Parsed);
    }

    #[test]
    fn redundant_worker_can_take_over() {
        assert!(WorkerState::Redundant.can_transition_to(WorkerState::Activated));
        assert!(!WorkerState::Redundant.can_transition_to(WorkerState::Installing));
    }
}
