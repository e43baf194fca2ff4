// library entry
pub mod algorithms;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod tests;

// Re-export key components for convenience
pub use algorithms::{
    BoundedLocalLimiter, RateLimitResult, RateLimiter, RemoteStoreLimiter, UNLIMITED,
};
pub use config::{RateLimitConfig, Registry};
pub use error::{RateLimiterError, Result, StorageError};
pub use factory::{create_limiter, get_limiter, reset_singleton};
pub use logging::init as init_logging;
pub use storage::{StorageBackend, StoragePipeline};
