//! Ordered background writer for UI-state snapshots.
//! Snapshots are queued on a channel and written one at a time in issue
//! order, so the render path never waits on disk I/O.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::KvStore;
use crate::diagnostics::{Diagnostics, Operation};
use crate::ui_state::PersistedUiState;

enum WriteOp {
    SaveUiState(PersistedUiState),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task. Dropping every handle stops the task once the
/// queue drains.
#[derive(Clone)]
pub struct PersistWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl PersistWriter {
    /// Spawn the write loop on the current Tokio runtime.
    pub fn spawn(store: KvStore, diagnostics: Arc<dyn Diagnostics>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(rx, store, diagnostics));
        Self { tx }
    }

    /// Queue a snapshot. Never blocks.
    pub fn save_ui_state(&self, state: PersistedUiState) {
        if self.tx.send(WriteOp::SaveUiState(state)).is_err() {
            debug!("persist writer gone, snapshot dropped");
        }
    }

    /// Wait until every write queued before this call has completed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    store: KvStore,
    diagnostics: Arc<dyn Diagnostics>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::SaveUiState(state) => {
                if let Err(e) = store.save_ui_state(&state).await {
                    diagnostics.best_effort_failed(Operation::SaveState, &e);
                } else {
                    debug!(?state, "ui state persisted");
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("persist writer exiting (channel closed)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::store::memory::MemoryRecordStore;

    fn snapshot(lang: &str, polite: bool) -> PersistedUiState {
        PersistedUiState {
            target_language: Some(lang.into()),
            show_polite: Some(polite),
        }
    }

    #[tokio::test]
    async fn writes_land_in_issue_order() {
        let store = KvStore::in_memory();
        let writer = PersistWriter::spawn(store.clone(), Arc::new(RecordingDiagnostics::new()));
        writer.save_ui_state(snapshot("ja", false));
        writer.save_ui_state(snapshot("ko", true));
        writer.save_ui_state(snapshot("th", false));
        writer.flush().await;
        assert_eq!(store.load_ui_state().await.unwrap(), Some(snapshot("th", false)));
    }

    #[tokio::test]
    async fn failures_go_to_diagnostics() {
        let backend = Arc::new(MemoryRecordStore::new());
        backend.set_available(false);
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let writer = PersistWriter::spawn(KvStore::new(backend), diagnostics.clone());
        writer.save_ui_state(snapshot("ja", true));
        writer.flush().await;
        assert_eq!(diagnostics.count(Operation::SaveState), 1);
    }
}
