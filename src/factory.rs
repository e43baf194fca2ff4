// src/factory.rs

//! Process-wide limiter selection.
//!
//! The backend is chosen from the environment: when both
//! `UPSTASH_REDIS_REST_URL` and `UPSTASH_REDIS_REST_TOKEN` are set the
//! limiter counts in the shared REST store, otherwise in process memory.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::algorithms::{BoundedLocalLimiter, RateLimiter, RemoteStoreLimiter};
use crate::config::{Registry, RemoteStoreConfig};
use crate::storage::RestStorage;

static SINGLETON: Mutex<Option<Arc<dyn RateLimiter>>> = Mutex::const_new(None);

/// Returns the shared limiter, building it on first use.
///
/// Passing a registry always builds a fresh limiter that is not cached, so
/// callers with custom rules never share state with the rest of the process.
pub async fn get_limiter(registry: Option<Registry>) -> Arc<dyn RateLimiter> {
    if let Some(registry) = registry {
        return build_limiter(registry);
    }

    let mut slot = SINGLETON.lock().await;
    if let Some(limiter) = slot.as_ref() {
        return Arc::clone(limiter);
    }

    let limiter = build_limiter(Registry::default());
    *slot = Some(Arc::clone(&limiter));
    limiter
}

/// Always builds a fresh in-memory limiter, whatever the environment says
pub fn create_limiter(registry: Option<Registry>) -> BoundedLocalLimiter {
    BoundedLocalLimiter::new(registry.unwrap_or_default())
}

/// Drops the cached limiter; the next `get_limiter(None)` builds a new one
pub async fn reset_singleton() {
    SINGLETON.lock().await.take();
}

fn build_limiter(registry: Registry) -> Arc<dyn RateLimiter> {
    let Some(remote) = RemoteStoreConfig::from_env() else {
        info!("Using in-memory rate limiter");
        return Arc::new(BoundedLocalLimiter::new(registry));
    };

    match RestStorage::new(remote) {
        Ok(storage) => {
            info!(url = %storage.config().url, "Using remote store rate limiter");
            Arc::new(RemoteStoreLimiter::new(storage, registry))
        }
        Err(e) => {
            warn!(error = %e, "Could not build remote store client, using in-memory rate limiter");
            Arc::new(BoundedLocalLimiter::new(registry))
        }
    }
}
