//! Paint target for rendered trees.
//! The desktop shell emits webview events; the headless surface queues
//! updates on an unbounded crossbeam channel so painting never blocks.

use crossbeam_channel as cb;
use tracing::debug;

use crate::render::Node;

pub trait Surface: Send + Sync {
    /// Replace the whole screen.
    fn paint(&self, tree: &Node);
    /// Replace only the connectivity footer.
    fn update_connectivity(&self, indicator: &Node);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUpdate {
    Paint(Node),
    Connectivity(Node),
}

impl SurfaceUpdate {
    pub fn is_full_paint(&self) -> bool {
        matches!(self, SurfaceUpdate::Paint(_))
    }

    pub fn node(&self) -> &Node {
        match self {
            SurfaceUpdate::Paint(node) | SurfaceUpdate::Connectivity(node) => node,
        }
    }
}

pub struct ChannelSurface {
    tx: cb::Sender<SurfaceUpdate>,
    rx: cb::Receiver<SurfaceUpdate>,
}

impl ChannelSurface {
    pub fn new() -> Self {
        let (tx, rx) = cb::unbounded();
        Self { tx, rx }
    }

    pub fn receiver(&self) -> cb::Receiver<SurfaceUpdate> {
        self.rx.clone()
    }

    /// Everything painted since the last drain, oldest first.
    pub fn drain(&self) -> Vec<SurfaceUpdate> {
        self.rx.try_iter().collect()
    }
}

impl Default for ChannelSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for ChannelSurface {
    fn paint(&self, tree: &Node) {
        let _ = self.tx.send(SurfaceUpdate::Paint(tree.clone()));
    }

    fn update_connectivity(&self, indicator: &Node) {
        debug!("connectivity badge queued");
        let _ = self.tx.send(SurfaceUpdate::Connectivity(indicator.clone()));
    }
}
