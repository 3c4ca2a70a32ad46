//! Startup and proxy timings. Each metric keeps a sliding window of its most
//! recent samples; `summary` is what the desktop shell reports.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

/// Samples kept per metric.
const WINDOW: usize = 128;

pub mod metric_names {
    pub const RENDER: &str = "t_render";
    pub const RESTORE_STATE: &str = "t_restore_state";
    pub const MIRROR_PHRASES: &str = "t_mirror_phrases";
    pub const PROXY_INSTALL: &str = "t_proxy_install";
    pub const PROXY_FETCH: &str = "t_proxy_fetch";
}

/// Correlates the log lines of one intercepted fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchId(Uuid);

impl FetchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FetchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Measures from creation until [`TimingSpan::finish`].
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// Record the elapsed time and return it in microseconds.
    pub fn finish(self) -> u64 {
        let elapsed_us = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub last_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub max_us: u64,
}

impl MetricSummary {
    fn from_window(window: &VecDeque<u64>) -> Self {
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let rank = |p: usize| sorted[(sorted.len() - 1) * p / 100];
        Self {
            count: sorted.len(),
            last_us: window.back().copied().unwrap_or(0),
            p50_us: rank(50),
            p95_us: rank(95),
            max_us: sorted.last().copied().unwrap_or(0),
        }
    }
}

#[derive(Default)]
pub struct MetricsRegistry {
    windows: Mutex<HashMap<&'static str, VecDeque<u64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &'static str, value_us: u64) {
        let mut windows = self.windows.lock();
        let window = windows
            .entry(name)
            .or_insert_with(|| VecDeque::with_capacity(WINDOW));
        if window.len() == WINDOW {
            window.pop_front();
        }
        window.push_back(value_us);
        tracing::trace!(metric = name, value_us, "timing recorded");
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Samples currently in the window for `name`.
    pub fn count(&self, name: &str) -> usize {
        self.windows.lock().get(name).map_or(0, VecDeque::len)
    }

    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        self.windows
            .lock()
            .iter()
            .filter(|(_, window)| !window.is_empty())
            .map(|(&name, window)| (name.to_string(), MetricSummary::from_window(window)))
            .collect()
    }
}
