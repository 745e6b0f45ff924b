//! Opt-in tracing bootstrap.
//!
//! The core only *emits* `tracing` events; hosts that want them printed
//! can call [`init`] once at startup (respects `RUST_LOG`), or install
//! their own subscriber instead.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber filtered by `RUST_LOG`.
/// Harmless when a subscriber is already installed.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
