//! Log subscriber setup for binaries embedding the engine.
//!
//! The filter comes from `RUST_LOG` and defaults to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::TaskError;

/// Installs a global fmt subscriber.
///
/// # Errors
///
/// Returns [`TaskError::Config`] if a global subscriber is already set.
pub fn try_init() -> Result<(), TaskError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TaskError::Config(format!("failed to install log subscriber: {e}")))
}

/// Installs a global fmt subscriber, ignoring an already installed one.
pub fn init() {
    if let Err(e) = try_init() {
        tracing::debug!(error = %e, "log subscriber already installed");
    }
}
