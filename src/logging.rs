//! Tracing subscriber setup for binaries and tests embedding the client
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application. These helpers install the usual `fmt` subscriber
//! filtered by `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber, defaulting to `info` when `RUST_LOG` is unset
pub fn init() -> bool {
    init_with_default("info")
}

/// Like [`init`], with a custom fallback directive
///
/// Returns false if a global subscriber was already installed.
pub fn init_with_default(directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .try_init()
        .is_ok()
}
