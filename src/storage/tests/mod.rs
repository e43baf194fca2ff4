// src/storage/tests/mod.rs


// Common utilities for storage tests
pub(crate) mod common {
    use std::time::Duration;

    use crate::error::Result;
    use crate::storage::{StorageBackend, StoragePipeline};

    // Runs one window batch and returns the count seen before the add
    pub async fn window_batch<S: StorageBackend>(
        storage: &S,
        key: &str,
        now: u64,
        window: Duration,
        member: &str,
    ) -> Result<i64> {
        let mut pipeline = storage.pipeline();
        pipeline
            .purge_before(key, now.saturating_sub(window.as_millis() as u64))
            .count(key)
            .add(key, now, member)
            .expire(key, window);

        let results = storage.execute_pipeline(pipeline).await?;
        assert_eq!(results.len(), 4, "one reply per command");

        let mut results = results.into_iter();
        results.next().unwrap()?;
        results.next().unwrap()
    }

    // Exercises the sorted-set contract every window store must honour
    pub async fn test_window_operations<S: StorageBackend>(storage: &S, key: &str) -> Result<()> {
        storage.delete(key).await?;
        let window = Duration::from_secs(10);

        assert_eq!(window_batch(storage, key, 100_000, window, "100000-a").await?, 0);
        assert_eq!(window_batch(storage, key, 100_001, window, "100001-b").await?, 1);
        assert_eq!(window_batch(storage, key, 100_001, window, "100001-c").await?, 2);

        // 10s later the first member (score 100000) is exactly at the cutoff and stays
        assert_eq!(window_batch(storage, key, 110_000, window, "110000-d").await?, 3);

        // one more millisecond and it is purged
        assert_eq!(window_batch(storage, key, 110_001, window, "110001-e").await?, 3);

        // member removal is exact
        assert!(storage.remove_member(key, "100001-b").await?);
        assert!(!storage.remove_member(key, "100001-b").await?);
        // the purge at 110002 also drops "100001-c"
        assert_eq!(window_batch(storage, key, 110_002, window, "110002-f").await?, 2);

        assert!(storage.delete(key).await?);
        assert!(!storage.delete(key).await?);
        assert_eq!(window_batch(storage, key, 110_003, window, "110003-g").await?, 0);

        storage.delete(key).await?;
        Ok(())
    }
}
