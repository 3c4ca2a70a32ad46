//! Phrasebook: offline-capable travel phrasebook.
//! Library crate with every component; the Tauri shell lives behind the
//! `desktop` feature.

pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod offline;
pub mod phrases;
pub mod prefs;
pub mod render;
pub mod store;
pub mod surface;
pub mod ui_state;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "phrasebook=debug,tauri=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `PHRASEBOOK_LOG_JSON=1` switches to JSON lines. Safe to call twice.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("PHRASEBOOK_LOG_JSON").is_ok_and(|v| v == "1");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
