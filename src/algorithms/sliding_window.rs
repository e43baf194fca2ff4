// src/algorithms/sliding_window.rs

use async_trait::async_trait;
use std::future::Future;
use tokio::runtime::Handle;
use tracing::{error, info, trace, warn};

use crate::algorithms::{duration_ceil_secs, now_millis, RateLimitResult, RateLimiter};
use crate::config::{RateLimitConfig, Registry};
use crate::error::{RateLimiterError, Result, StorageError};
use crate::rate_limit_event;
use crate::storage::{StorageBackend, StoragePipeline};

/// Sliding window limiter backed by a shared sorted-set store.
///
/// Every request becomes one set member scored with its arrival time. A
/// check purges members older than `now - window`, counts what is left and
/// adds the new member in one atomic batch, so the window moves with the
/// clock instead of snapping to boundaries and a client cannot fit two full
/// quotas around a rollover.
///
/// When the store cannot be reached the request is allowed.
#[derive(Debug, Clone)]
pub struct RemoteStoreLimiter<S>
where
    S: StorageBackend,
{
    /// Storage backend holding the window sets
    storage: S,

    /// Prefix rules
    registry: Registry,
}

/// Outcome of the batch for one request
struct WindowCount {
    /// Members in the window before this request was added
    before: u64,
}

impl<S> RemoteStoreLimiter<S>
where
    S: StorageBackend,
{
    pub fn new(storage: S, registry: Registry) -> Self {
        Self { storage, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn window_key(&self, identifier: &str, prefix: &str) -> String {
        format!("{}:{}:{}", self.storage.key_prefix(), identifier, prefix)
    }

    // Unique per request even when two land in the same millisecond
    fn member(now: u64) -> String {
        format!("{}-{:016x}", now, rand::random::<u64>())
    }

    async fn record_request(
        &self,
        key: &str,
        member: &str,
        config: &RateLimitConfig,
        now: u64,
    ) -> Result<WindowCount> {
        let mut pipeline = self.storage.pipeline();
        pipeline
            .purge_before(key, now.saturating_sub(config.window_ms()))
            .count(key)
            .add(key, now, member)
            .expire(key, config.window);

        let mut replies = self.storage.execute_pipeline(pipeline).await?.into_iter();

        // the purge reply is not needed, but its error is
        let _purged = replies.next().transpose()?;
        let before = replies.next().transpose()?.ok_or_else(|| {
            RateLimiterError::Storage(StorageError::Serialization(
                "missing count reply".to_string(),
            ))
        })?;

        // the count stands even if recording failed; the request just goes uncounted
        for (operation, reply) in ["add", "expire"].into_iter().zip(replies) {
            if let Err(e) = reply {
                warn!(key = %key, operation, error = %e, "Request not recorded in window");
            }
        }

        Ok(WindowCount {
            before: before.max(0) as u64,
        })
    }
}

/// Runs an operation whose failure changes nothing for the caller.
///
/// Used to take back the member of a rejected request; if that fails the
/// member simply ages out with the window.
async fn best_effort<F, T>(operation: &'static str, fut: F)
where
    F: Future<Output = Result<T>>,
{
    if let Err(e) = fut.await {
        trace!(operation, error = %e, "Best-effort store operation failed");
    }
}

/// Takes the member of a rejected request back out of its window.
///
/// Detached from the request when a tokio runtime is available, so a slow
/// store never holds up the rejection; errors are ignored either way.
async fn compensate<S>(storage: S, key: String, member: String)
where
    S: StorageBackend + Clone + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                best_effort("remove_member", storage.remove_member(&key, &member)).await;
            });
        }
        Err(_) => best_effort("remove_member", storage.remove_member(&key, &member)).await,
    }
}

#[async_trait]
impl<S> RateLimiter for RemoteStoreLimiter<S>
where
    S: StorageBackend + Clone + 'static,
{
    async fn check(&self, identifier: &str, path: &str) -> RateLimitResult {
        let Some((prefix, config)) = self.registry.resolve(path) else {
            return RateLimitResult::unlimited();
        };

        let now = now_millis();
        let reset_time = now.saturating_add(config.window_ms());
        let key = self.window_key(identifier, prefix);
        let member = Self::member(now);

        let count = match self.record_request(&key, &member, config, now).await {
            Ok(count) => count,
            Err(e) => {
                error!(key = %key, error = %e, "Rate limit store unavailable, allowing request");
                return RateLimitResult::allowed(config.max_requests, reset_time);
            }
        };

        let allowed = count.before < config.max_requests;
        rate_limit_event!(
            self.backend_name(),
            identifier,
            prefix,
            allowed,
            config.max_requests,
            config.window_ms()
        );

        if !allowed {
            compensate(self.storage.clone(), key, member).await;
            info!(identifier, prefix, "Request rate limited");
            return RateLimitResult::rejected(reset_time, duration_ceil_secs(config.window));
        }

        RateLimitResult::allowed(config.max_requests - count.before - 1, reset_time)
    }

    async fn reset(&self, identifier: &str, path: &str) {
        let Some((prefix, _)) = self.registry.resolve(path) else {
            return;
        };

        let key = self.window_key(identifier, prefix);
        if let Err(e) = self.storage.delete(&key).await {
            error!(key = %key, error = %e, "Failed to reset rate limit");
        }
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}
