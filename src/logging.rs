use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,route_limiter=trace
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // try_init so an embedding application that already installed a
        // subscriber keeps it
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init()
            .is_ok();

        if installed {
            tracing::info!("Logging initialized");
        }
    });
}

/// Macro for logging rate limiting decisions
#[macro_export]
macro_rules! rate_limit_event {
    ($backend:expr, $identifier:expr, $prefix:expr, $allowed:expr, $limit:expr, $window_ms:expr) => {
        tracing::debug!(
            backend = $backend,
            identifier = $identifier,
            prefix = $prefix,
            allowed = $allowed,
            limit = $limit,
            window_ms = $window_ms,
            "Rate limit check"
        )
    };
}

/// Macro for logging storage operations with timing
#[macro_export]
macro_rules! storage_op {
    ($operation:expr, $key:expr, $result:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            operation = $operation,
            key = $key,
            success = $result.is_ok(),
            elapsed_ms = $elapsed_ms,
            "Storage operation"
        )
    };
}
