// src/test_utils.rs

use super::config::{RateLimitConfig, Registry};
use super::error::{RateLimiterError, Result, StorageError};
use super::storage::{StorageBackend, StoragePipeline};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock implementation of the StoragePipeline trait for testing
#[derive(Debug, Default)]
pub struct MockStoragePipeline {
    operations: Vec<MockOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockOperation {
    PurgeBefore(String, u64),
    Count(String),
    Add(String, u64, String),
    Expire(String, Duration),
}

impl StoragePipeline for MockStoragePipeline {
    fn purge_before(&mut self, key: &str, cutoff: u64) -> &mut Self {
        self.operations
            .push(MockOperation::PurgeBefore(key.to_string(), cutoff));
        self
    }

    fn count(&mut self, key: &str) -> &mut Self {
        self.operations.push(MockOperation::Count(key.to_string()));
        self
    }

    fn add(&mut self, key: &str, score: u64, member: &str) -> &mut Self {
        self.operations.push(MockOperation::Add(
            key.to_string(),
            score,
            member.to_string(),
        ));
        self
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.operations
            .push(MockOperation::Expire(key.to_string(), ttl));
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    // key -> (score, member)
    sets: HashMap<String, Vec<(u64, String)>>,
    ttls: HashMap<String, Duration>,
    last_batch: Vec<MockOperation>,
}

/// In-memory sorted-set store with switchable failures
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    state: Arc<Mutex<MockState>>,
    fail_pipeline: Arc<AtomicBool>,
    fail_remove: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
    fail_add: Arc<AtomicBool>,
    remove_delay_ms: Arc<AtomicU64>,
    pipeline_calls: Arc<AtomicUsize>,
    remove_calls: Arc<AtomicUsize>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_pipeline(&self, fail: bool) {
        self.fail_pipeline.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Makes the add reply of every batch an error entry, like WRONGTYPE
    pub fn set_fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    pub fn set_remove_delay(&self, delay: Duration) {
        self.remove_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn pipeline_calls(&self) -> usize {
        self.pipeline_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    pub fn member_count(&self, key: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.sets.get(key).map_or(0, Vec::len)
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.state.lock().unwrap().ttls.get(key).copied()
    }

    pub fn last_batch(&self) -> Vec<MockOperation> {
        self.state.lock().unwrap().last_batch.clone()
    }

    /// Inserts a member directly, e.g. to age a window artificially
    pub fn seed(&self, key: &str, score: u64, member: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .sets
            .entry(key.to_string())
            .or_default()
            .push((score, member.to_string()));
    }

    fn unavailable() -> RateLimiterError {
        RateLimiterError::Storage(StorageError::Connection(
            "mock store unavailable".to_string(),
        ))
    }
}

#[async_trait]
impl StorageBackend for MockStorage {
    type Config = ();
    type Pipeline = MockStoragePipeline;

    async fn new(_config: Self::Config) -> Result<Self> {
        Ok(Self::new())
    }

    fn key_prefix(&self) -> &str {
        "test"
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        let delay = self.remove_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let mut state = self.state.lock().unwrap();
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(false);
        };
        let before = set.len();
        set.retain(|(_, m)| m != member);
        let removed = set.len() < before;
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let mut state = self.state.lock().unwrap();
        state.ttls.remove(key);
        Ok(state.sets.remove(key).is_some())
    }

    fn pipeline(&self) -> Self::Pipeline {
        MockStoragePipeline::default()
    }

    // The whole batch runs under one lock, like MULTI/EXEC
    async fn execute_pipeline(&self, pipeline: Self::Pipeline) -> Result<Vec<Result<i64>>> {
        self.pipeline_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pipeline.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let mut state = self.state.lock().unwrap();
        state.last_batch = pipeline.operations.clone();

        let mut results = Vec::with_capacity(pipeline.operations.len());
        for op in pipeline.operations {
            match op {
                MockOperation::PurgeBefore(key, cutoff) => {
                    let mut removed = 0;
                    if let Some(set) = state.sets.get_mut(&key) {
                        let before = set.len();
                        set.retain(|(score, _)| *score >= cutoff);
                        removed = before - set.len();
                        if set.is_empty() {
                            state.sets.remove(&key);
                        }
                    }
                    results.push(Ok(removed as i64));
                }
                MockOperation::Count(key) => {
                    let count = state.sets.get(&key).map_or(0, Vec::len);
                    results.push(Ok(count as i64));
                }
                MockOperation::Add(_, _, _) if self.fail_add.load(Ordering::SeqCst) => {
                    results.push(Err(RateLimiterError::Storage(StorageError::Command(
                        "WRONGTYPE Operation against a key holding the wrong kind of value"
                            .to_string(),
                    ))));
                }
                MockOperation::Add(key, score, member) => {
                    let set = state.sets.entry(key).or_default();
                    let added = !set.iter().any(|(_, m)| *m == member);
                    if added {
                        set.push((score, member));
                    }
                    results.push(Ok(added as i64));
                }
                MockOperation::Expire(key, ttl) => {
                    let exists = state.sets.contains_key(&key);
                    if exists {
                        state.ttls.insert(key, ttl);
                    }
                    results.push(Ok(exists as i64));
                }
            }
        }

        Ok(results)
    }
}

/// Registry with a single rule, for focused tests
pub fn single_rule(prefix: &str, max_requests: u64, window: Duration) -> Registry {
    Registry::empty()
        .with_rule(prefix, RateLimitConfig::new(max_requests, window).unwrap())
        .unwrap()
}

/// Polls `condition` until it holds or a second has passed.
///
/// Rejected-request compensation runs detached, so tests observing its
/// effect have to wait for it.
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
