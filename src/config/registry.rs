// src/config/registry.rs

use serde::Deserialize;
use std::time::Duration;

use super::RateLimitConfig;
use crate::error::{RateLimiterError, Result};

/// Ordered table of path prefixes and the quota each one carries.
///
/// Lookup walks the table in registration order and returns the first prefix
/// the request path starts with, so a sub-route such as
/// `/api/auth/login/oauth` shares the bucket of `/api/auth/login`. When two
/// registered prefixes can both match a path, the one registered first wins:
/// register more specific prefixes before less specific ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    rules: Vec<(String, RateLimitConfig)>,
}

#[derive(Deserialize)]
struct RuleEntry {
    prefix: String,
    #[serde(flatten)]
    config: RateLimitConfig,
}

impl Registry {
    /// An empty table; every path is unregulated
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule, or replaces the quota of an already registered prefix
    /// in place (keeping its position).
    pub fn insert(&mut self, prefix: impl Into<String>, config: RateLimitConfig) -> Result<()> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(RateLimiterError::Config(
                "rate limit prefix must not be empty".to_string(),
            ));
        }
        config.validate()?;

        match self.rules.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, existing)) => *existing = config,
            None => self.rules.push((prefix, config)),
        }
        Ok(())
    }

    /// Builder-style [`Registry::insert`]
    pub fn with_rule(mut self, prefix: impl Into<String>, config: RateLimitConfig) -> Result<Self> {
        self.insert(prefix, config)?;
        Ok(self)
    }

    /// Loads an ordered JSON array of `{"prefix", "max_requests", "window_ms"}` objects
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<RuleEntry> = serde_json::from_str(json)
            .map_err(|e| RateLimiterError::Config(format!("invalid rate limit rules: {}", e)))?;

        let mut registry = Self::empty();
        for entry in entries {
            if registry.get(&entry.prefix).is_some() {
                return Err(RateLimiterError::Config(format!(
                    "duplicate rate limit prefix: {}",
                    entry.prefix
                )));
            }
            registry.insert(entry.prefix, entry.config)?;
        }
        Ok(registry)
    }

    /// Finds the rule governing `path`; `None` means the path is unregulated
    pub fn resolve(&self, path: &str) -> Option<(&str, &RateLimitConfig)> {
        self.rules
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, config)| (prefix.as_str(), config))
    }

    /// Exact lookup by registered prefix
    pub fn get(&self, prefix: &str) -> Option<&RateLimitConfig> {
        self.rules
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, config)| config)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateLimitConfig)> {
        self.rules.iter().map(|(p, c)| (p.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// The built-in table covering the credential and public contact endpoints
impl Default for Registry {
    fn default() -> Self {
        let rules = [
            ("/api/auth/login", 5, 15 * MINUTE),
            ("/api/auth/register", 3, HOUR),
            ("/api/auth/forgot-password", 3, HOUR),
            ("/api/auth/reset-password", 5, HOUR),
            ("/api/contact", 5, HOUR),
        ];

        Self {
            rules: rules
                .into_iter()
                .map(|(prefix, max_requests, secs)| {
                    (
                        prefix.to_string(),
                        RateLimitConfig {
                            max_requests,
                            window: Duration::from_secs(secs),
                        },
                    )
                })
                .collect(),
        }
    }
}
