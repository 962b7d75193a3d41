//! Tracing subscriber setup for Suraxit nodes.
//!
//! Levels used across the crate:
//! - WARN: peer blackout, alerts that were never acknowledged, radio errors
//! - INFO: alerts originated/consumed, peers joining or recovering
//! - DEBUG: relay decisions, malformed frames, link state changes
//! - TRACE: duplicates and raw datagrams

use tracing_subscriber::EnvFilter;

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Human-readable output, level from `RUST_LOG` (default `info`)
pub fn init() {
    tracing_subscriber::fmt().with_env_filter(env_filter("info")).init();
}

/// JSON lines output for collection by a gateway host
pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter("info"))
        .init();
}

/// Safe to call from every test; only the first call installs a subscriber
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}
