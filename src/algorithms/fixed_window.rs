// src/algorithms/fixed_window.rs

use async_trait::async_trait;
use tracing::{info, warn};

use crate::algorithms::{ceil_secs, duration_ceil_secs, now_millis, RateLimitResult, RateLimiter};
use crate::config::{InMemoryConfig, RateLimitConfig, Registry};
use crate::rate_limit_event;
use crate::storage::memory::{MemoryStorage, WindowRecord};

/// Fixed window limiter over a bounded in-process table.
///
/// A window opens with the first request for an `identifier:prefix` key and
/// lasts `window` from that moment; the next request after it ends starts a
/// fresh window. Once the table holds `max_entries` live records, requests
/// that would need a new record are rejected until expired ones can be
/// swept, which caps memory at the cost of refusing new callers under a
/// flood.
#[derive(Debug, Clone)]
pub struct BoundedLocalLimiter {
    /// Record table shared by all checks on this limiter
    storage: MemoryStorage,

    /// Prefix rules
    registry: Registry,
}

impl BoundedLocalLimiter {
    pub fn new(registry: Registry) -> Self {
        Self::with_storage(registry, MemoryStorage::new(InMemoryConfig::default()))
    }

    pub fn with_storage(registry: Registry, storage: MemoryStorage) -> Self {
        Self { storage, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    fn record_key(identifier: &str, prefix: &str) -> String {
        format!("{}:{}", identifier, prefix)
    }

    fn check_at(&self, key: String, config: &RateLimitConfig, now: u64) -> RateLimitResult {
        let mut table = self.storage.lock();

        if !table.admit(&key, now) {
            let retry_after = self.storage.config().capacity_retry_after;
            warn!(
                key = %key,
                entries = table.len(),
                "Rate limit table full, rejecting new key"
            );
            return RateLimitResult::rejected(
                now.saturating_add(u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX)),
                duration_ceil_secs(retry_after),
            );
        }

        if let Some(record) = table.live_mut(&key, now) {
            if record.count >= config.max_requests {
                let retry_after = ceil_secs(record.reset_time - now);
                return RateLimitResult::rejected(record.reset_time, retry_after);
            }
            record.count += 1;
            return RateLimitResult::allowed(
                config.max_requests - record.count,
                record.reset_time,
            );
        }

        let record = WindowRecord {
            count: 1,
            reset_time: now.saturating_add(config.window_ms()),
        };
        table.insert(key, record);
        RateLimitResult::allowed(config.max_requests - 1, record.reset_time)
    }
}

impl Default for BoundedLocalLimiter {
    fn default() -> Self {
        Self::new(Registry::default())
    }
}

#[async_trait]
impl RateLimiter for BoundedLocalLimiter {
    async fn check(&self, identifier: &str, path: &str) -> RateLimitResult {
        let Some((prefix, config)) = self.registry.resolve(path) else {
            return RateLimitResult::unlimited();
        };

        let key = Self::record_key(identifier, prefix);
        let result = self.check_at(key, config, now_millis());

        rate_limit_event!(
            self.backend_name(),
            identifier,
            prefix,
            result.allowed,
            config.max_requests,
            config.window_ms()
        );
        if !result.allowed {
            info!(identifier, prefix, retry_after = ?result.retry_after, "Request rate limited");
        }

        result
    }

    async fn reset(&self, identifier: &str, path: &str) {
        if let Some((prefix, _)) = self.registry.resolve(path) {
            self.storage.delete(&Self::record_key(identifier, prefix));
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
