// src/algorithms/mod.rs

pub mod fixed_window;
pub mod sliding_window;

#[cfg(test)]
mod tests;

pub use fixed_window::BoundedLocalLimiter;
pub use sliding_window::RemoteStoreLimiter;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;

/// `remaining` value reported for paths no rule applies to
pub const UNLIMITED: u64 = u64::MAX;

/// Decision returned by [`RateLimiter::check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Requests left in the current window, or [`UNLIMITED`]
    pub remaining: u64,

    /// When the current window ends, in epoch milliseconds (0 when unregulated)
    pub reset_time: u64,

    /// Seconds the caller should wait before retrying; set only on rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// Result for a path no rule applies to
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: UNLIMITED,
            reset_time: 0,
            retry_after: None,
        }
    }

    pub(crate) fn allowed(remaining: u64, reset_time: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_time,
            retry_after: None,
        }
    }

    pub(crate) fn rejected(reset_time: u64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time,
            retry_after: Some(retry_after.max(1)),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining == UNLIMITED
    }
}

/// Per-identifier, per-route request quota.
///
/// Neither method can fail: backend trouble is resolved inside the
/// implementation into a decision (or, for `reset`, a logged no-op), so
/// request handlers can call it unconditionally.
#[async_trait]
pub trait RateLimiter: Send + Sync + Debug {
    /// Decides whether `identifier` may make a request to `path` and records it
    async fn check(&self, identifier: &str, path: &str) -> RateLimitResult;

    /// Forgets everything recorded for `identifier` under the rule governing `path`
    async fn reset(&self, identifier: &str, path: &str);

    /// Short backend label for diagnostics
    fn backend_name(&self) -> &'static str;
}

/// Current wall clock time in epoch milliseconds
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Whole seconds covering `millis`, rounded up
pub(crate) fn ceil_secs(millis: u64) -> u64 {
    millis.div_ceil(1000)
}

pub(crate) fn duration_ceil_secs(duration: Duration) -> u64 {
    ceil_secs(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
