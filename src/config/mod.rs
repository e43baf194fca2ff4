// src/config/mod.rs

mod registry;

pub use registry::Registry;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RateLimiterError, Result};

/// Environment variable holding the REST endpoint of the remote store
pub const REMOTE_URL_ENV: &str = "UPSTASH_REDIS_REST_URL";

/// Environment variable holding the bearer token of the remote store
pub const REMOTE_TOKEN_ENV: &str = "UPSTASH_REDIS_REST_TOKEN";

/// Longest accepted window; store scores and TTLs are signed 64-bit
pub const MAX_WINDOW_MS: u64 = i64::MAX as u64;

/// Quota applied to every path under one registered prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed in the window
    pub max_requests: u64,

    /// Window duration
    #[serde(rename = "window_ms", with = "duration_serde")]
    pub window: Duration,
}

impl RateLimitConfig {
    /// Creates a validated quota; both the request count and the window must be non-zero
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        let config = Self {
            max_requests,
            window,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(RateLimiterError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_ms() == 0 {
            return Err(RateLimiterError::Config(
                "window must be at least one millisecond".to_string(),
            ));
        }
        if self.window.as_millis() > MAX_WINDOW_MS as u128 {
            return Err(RateLimiterError::Config(format!(
                "window must not exceed {} milliseconds",
                MAX_WINDOW_MS
            )));
        }
        Ok(())
    }

    /// Window length in whole milliseconds
    pub fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Configuration for the bounded in-memory record table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Hard cap on the number of records held at once
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Table size above which expired records are swept before admitting a request
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: usize,

    /// Retry hint handed out when the table is full
    #[serde(default = "default_capacity_retry_after", with = "duration_serde")]
    pub capacity_retry_after: Duration,

    /// Whether to also sweep expired records from a background task
    #[serde(default)]
    pub use_background_task: bool,

    /// How often the background sweep runs
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            cleanup_threshold: default_cleanup_threshold(),
            capacity_retry_after: default_capacity_retry_after(),
            use_background_task: false,
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_max_entries() -> usize {
    10_000
}

fn default_cleanup_threshold() -> usize {
    8_000
}

fn default_capacity_retry_after() -> Duration {
    Duration::from_secs(60)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

/// Configuration for the HTTP sorted-set store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    /// Base URL of the REST endpoint, without trailing slash
    pub url: String,

    /// Bearer token sent with every request
    pub token: String,

    /// Namespace prepended to every window key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a single HTTP round trip
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl RemoteStoreConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            key_prefix: default_key_prefix(),
            timeout: default_timeout(),
        }
    }

    /// Reads the store location from the process environment.
    ///
    /// Returns `None` unless both variables are set and non-empty.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(
            std::env::var(REMOTE_URL_ENV).ok(),
            std::env::var(REMOTE_TOKEN_ENV).ok(),
        )
    }

    pub fn from_vars(url: Option<String>, token: Option<String>) -> Option<Self> {
        let url = url.filter(|u| !u.trim().is_empty())?;
        let token = token.filter(|t| !t.trim().is_empty())?;
        Some(Self::new(url.trim(), token.trim()))
    }
}

/// Configuration for the native Redis store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Namespace prepended to every window key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_validation() {
        assert!(RateLimitConfig::new(5, Duration::from_secs(900)).is_ok());
        assert!(matches!(
            RateLimitConfig::new(0, Duration::from_secs(1)),
            Err(RateLimiterError::Config(_))
        ));
        assert!(matches!(
            RateLimitConfig::new(5, Duration::from_micros(10)),
            Err(RateLimiterError::Config(_))
        ));
    }

    #[test]
    fn test_window_upper_bound() {
        let longest = RateLimitConfig::new(5, Duration::from_millis(MAX_WINDOW_MS)).unwrap();
        assert_eq!(longest.window_ms(), MAX_WINDOW_MS);

        assert!(matches!(
            RateLimitConfig::new(5, Duration::from_millis(MAX_WINDOW_MS + 1)),
            Err(RateLimiterError::Config(_))
        ));
        assert!(matches!(
            RateLimitConfig::new(5, Duration::MAX),
            Err(RateLimiterError::Config(_))
        ));
        assert_eq!(
            RateLimitConfig {
                max_requests: 1,
                window: Duration::MAX,
            }
            .window_ms(),
            u64::MAX
        );
    }

    #[test]
    fn test_rate_limit_config_serde_uses_millis() {
        let config = RateLimitConfig::new(3, Duration::from_secs(2)).unwrap();
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["window_ms"], 2000);
        assert_eq!(json["max_requests"], 3);

        let back: RateLimitConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_in_memory_defaults() {
        let config = InMemoryConfig::default();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.cleanup_threshold, 8_000);
        assert_eq!(config.capacity_retry_after, Duration::from_secs(60));
        assert!(!config.use_background_task);

        // serde defaults agree with Default
        let parsed: InMemoryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.max_entries, config.max_entries);
        assert_eq!(parsed.cleanup_threshold, config.cleanup_threshold);
    }

    #[test]
    fn test_remote_config_requires_both_vars() {
        assert!(RemoteStoreConfig::from_vars(None, None).is_none());
        assert!(RemoteStoreConfig::from_vars(Some("https://kv.example".into()), None).is_none());
        assert!(RemoteStoreConfig::from_vars(None, Some("token".into())).is_none());
        assert!(
            RemoteStoreConfig::from_vars(Some("  ".into()), Some("token".into())).is_none(),
            "blank url should not select the remote store"
        );

        let config = RemoteStoreConfig::from_vars(
            Some("https://kv.example/".into()),
            Some("secret".into()),
        )
        .unwrap();
        assert_eq!(config.url, "https://kv.example");
        assert_eq!(config.token, "secret");
        assert_eq!(config.key_prefix, "ratelimit");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
