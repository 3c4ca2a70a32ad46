//! Diagnostics sink for best-effort operations.
//! Persistence and registration failures never reach the user; they are
//! reported here instead of being dropped.

use std::fmt;

use parking_lot::Mutex;
use tracing::warn;

/// Best-effort operations whose failures are swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RegisterProxy,
    PersistentStorage,
    RestoreState,
    SaveState,
    MirrorPhrases,
    WritePreference,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::RegisterProxy => write!(f, "register_proxy"),
            Operation::PersistentStorage => write!(f, "persistent_storage"),
            Operation::RestoreState => write!(f, "restore_state"),
            Operation::SaveState => write!(f, "save_state"),
            Operation::MirrorPhrases => write!(f, "mirror_phrases"),
            Operation::WritePreference => write!(f, "write_preference"),
        }
    }
}

pub trait Diagnostics: Send + Sync {
    fn best_effort_failed(&self, operation: Operation, error: &dyn fmt::Display);
}

/// Default sink: a `warn!` event per failure.
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn best_effort_failed(&self, operation: Operation, error: &dyn fmt::Display) {
        warn!(operation = %operation, error = %error, "best-effort operation failed");
    }
}

/// Keeps every reported failure in memory so tests can assert on them.
#[derive(Default)]
pub struct RecordingDiagnostics {
    failures: Mutex<Vec<(Operation, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<(Operation, String)> {
        self.failures.lock().clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.failures
            .lock()
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn best_effort_failed(&self, operation: Operation, error: &dyn fmt::Display) {
        self.failures.lock().push((operation, error.to_string()));
    }
}
