//! Bootstrap utilities shared by binaries and tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable controlling the tracing filter.
pub const LOG_ENV_VAR: &str = "ORDERFLOW_LOG";

/// Initialize tracing with the ORDERFLOW_LOG environment variable.
///
/// Defaults to "info" level if ORDERFLOW_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
