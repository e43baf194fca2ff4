// src/storage/memory.rs

// Bounded record table backing the in-process limiter.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::time;
use tracing::debug;

use crate::algorithms::now_millis;
use crate::config::InMemoryConfig;

/// Counter for one identifier under one prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    pub count: u64,

    /// End of the record's window, epoch milliseconds
    pub reset_time: u64,
}

impl WindowRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset_time
    }
}

/// The map itself plus its size bounds. Only reachable through
/// [`MemoryStorage::lock`], so every read-modify-write happens under one guard.
#[derive(Debug)]
pub struct RecordTable {
    entries: HashMap<String, WindowRecord>,
    max_entries: usize,
    cleanup_threshold: usize,
}

impl RecordTable {
    fn new(config: &InMemoryConfig) -> Self {
        Self {
            entries: HashMap::with_capacity(config.max_entries.min(10_000)),
            max_entries: config.max_entries,
            cleanup_threshold: config.cleanup_threshold.min(config.max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every record whose window has ended; returns how many were removed
    pub fn sweep_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.is_expired(now));
        before - self.entries.len()
    }

    /// Sweeps once the table has grown past the cleanup threshold, then
    /// reports whether a record for `key` may be stored.
    ///
    /// Keys already present never grow the table and are always admitted.
    pub fn admit(&mut self, key: &str, now: u64) -> bool {
        if self.entries.len() > self.cleanup_threshold {
            let removed = self.sweep_expired(now);
            if removed > 0 {
                debug!(removed, remaining = self.entries.len(), "Swept expired records");
            }
        }
        self.entries.contains_key(key) || self.entries.len() < self.max_entries
    }

    /// The record for `key` if its window is still open
    pub fn live_mut(&mut self, key: &str, now: u64) -> Option<&mut WindowRecord> {
        self.entries
            .get_mut(key)
            .filter(|record| !record.is_expired(now))
    }

    pub fn insert(&mut self, key: String, record: WindowRecord) {
        self.entries.insert(key, record);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }
}

/// In-memory storage for window records, bounded by `max_entries`
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    table: Arc<Mutex<RecordTable>>,
    config: InMemoryConfig,
}

impl MemoryStorage {
    /// Creates a new in-memory storage with the given configuration
    pub fn new(config: InMemoryConfig) -> Self {
        let table = Arc::new(Mutex::new(RecordTable::new(&config)));

        if config.use_background_task {
            Self::spawn_cleanup(Arc::downgrade(&table), &config);
        }

        Self { table, config }
    }

    // The task holds a weak handle and exits once the storage is dropped.
    fn spawn_cleanup(table: Weak<Mutex<RecordTable>>, config: &InMemoryConfig) {
        let Ok(handle) = Handle::try_current() else {
            debug!("No tokio runtime available, relying on lazy sweeps only");
            return;
        };

        let period = config.cleanup_interval;
        handle.spawn(async move {
            let mut interval = time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(table) = table.upgrade() else {
                    break;
                };
                let removed = lock_table(&table).sweep_expired(now_millis());
                if removed > 0 {
                    debug!(removed, "Background sweep removed expired records");
                }
            }
        });
    }

    /// Locks the table for a read-modify-write
    pub fn lock(&self) -> MutexGuard<'_, RecordTable> {
        lock_table(&self.table)
    }

    pub fn config(&self) -> &InMemoryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key)
    }
}

// A panic while holding the lock cannot leave a record half-written, so a
// poisoned table is still consistent.
fn lock_table(table: &Mutex<RecordTable>) -> MutexGuard<'_, RecordTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
