//! Event queue in front of the lifecycle controller.
//! A single task drains it, so events run to completion in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::lifecycle::{LifecycleController, LifecycleEvent};

const QUEUE_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl EventQueue {
    pub fn new() -> (Self, mpsc::Receiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queue an event. Waits for a slot when the queue is full; returns false
    /// once the loop has stopped.
    pub async fn submit(&self, event: LifecycleEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("event queue full, awaiting slot");
                self.tx.send(event).await.is_ok()
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("event queue closed");
                false
            }
        }
    }
}

/// Drain events until the channel closes or `shutdown` fires, then flush
/// pending persistence.
pub async fn run_event_loop(
    controller: Arc<LifecycleController>,
    mut rx: mpsc::Receiver<LifecycleEvent>,
    shutdown: CancellationToken,
) {
    info!("event loop started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("event loop cancelled");
                break;
            }
            event = rx.recv() => event,
        };
        let Some(event) = event else {
            info!("event queue closed, exiting loop");
            break;
        };
        if let Err(e) = controller.handle(event).await {
            warn!(error = %e, "event rejected");
        }
    }
    controller.flush().await;
}
