//! Logging setup built on `tracing` and `tracing-subscriber`.
//!
//! # Example
//!
//! ```rust,ignore
//! use braid_runtime::logging;
//!
//! fn main() {
//!     // Default: `info`, overridable through RUST_LOG.
//!     logging::init();
//!
//!     // Or pick a directive explicitly:
//!     logging::init_with_filter("braid=debug");
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

/// Tracks whether a subscriber has already been installed, so the runtime
/// can initialize logging implicitly without clobbering an explicit setup.
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes logging with the default `info` directive.
pub fn init() {
    init_with_filter("info");
}

/// Initializes logging with a custom filter directive.
///
/// `RUST_LOG` takes priority when set. Repeated calls are no-ops.
pub fn init_with_filter(directive: &str) {
    if LOGGING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Returns whether logging has been initialized through this module.
pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::SeqCst)
}
