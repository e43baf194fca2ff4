// src/storage/mod.rs

pub mod memory;
pub mod redis;
pub mod rest;

#[cfg(test)]
mod tests;

pub use memory::{MemoryStorage, RecordTable, WindowRecord};
pub use redis::{RedisPipeline, RedisStorage};
pub use rest::{RestPipeline, RestStorage};

use super::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

// A batch of sorted-set commands executed atomically by the store
pub trait StoragePipeline: Send + Sync {
    // Remove members scored strictly below `cutoff`
    fn purge_before(&mut self, key: &str, cutoff: u64) -> &mut Self;

    // Count the members of the set
    fn count(&mut self, key: &str) -> &mut Self;

    // Add a member with the given score
    fn add(&mut self, key: &str, score: u64, member: &str) -> &mut Self;

    // Refresh the key's time to live (whole seconds, rounded up)
    fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self;
}

/// Sorted-set store shared by every instance of the service
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    // The type of configuration this storage backend accepts
    type Config: Send + Sync;

    // The type of pipeline this storage backend uses
    type Pipeline: StoragePipeline;

    // Creates a new instance of this storage backend with the given configuration
    async fn new(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    // Namespace for window keys
    fn key_prefix(&self) -> &str;

    // Removes a single member; true if it was present
    async fn remove_member(&self, key: &str, member: &str) -> Result<bool>;

    // Deletes a key
    async fn delete(&self, key: &str) -> Result<bool>;

    // Creates a new pipeline for executing multiple operations
    fn pipeline(&self) -> Self::Pipeline;

    // Executes a pipeline atomically; one integer reply (or error) per command
    async fn execute_pipeline(&self, pipeline: Self::Pipeline) -> Result<Vec<Result<i64>>>;
}

pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .div_ceil(1000)
        .max(1)
}
