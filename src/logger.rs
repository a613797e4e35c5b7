//! Log output setup.
//!
//! The daemon logs through `tracing`; this installs a stderr subscriber. `RUST_LOG`, when
//! set, overrides the configured filter.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (e.g. by a test harness or an
/// embedding application); the existing one is left in place.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .is_ok()
}
