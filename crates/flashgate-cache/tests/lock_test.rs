//! Distributed lock against the in-memory store

#[cfg(test)]
mod tests {
    use flashgate_cache::{DistributedLock, MemoryStore};
    use flashgate_core::traits::CacheService;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_only_one_concurrent_acquirer_wins() {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(Arc::clone(&store));

        let attempts = (0..50).map(|_| {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.try_lock("lock:shop:1", Duration::from_secs(10))
                    .await
                    .unwrap()
            })
        });

        let mut winners = Vec::new();
        for attempt in attempts {
            if let Some(handle) = attempt.await.unwrap() {
                winners.push(handle);
            }
        }
        assert_eq!(winners.len(), 1);

        let handle = winners.pop().unwrap();
        assert!(lock.unlock(handle).await.unwrap());
        assert!(lock
            .try_lock("lock:shop:1", Duration::from_secs(10))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_same_holder_cannot_reenter() {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(store);

        assert!(lock
            .acquire("lock:order:1", "holder-a", Duration::from_secs(5))
            .await
            .unwrap());
        assert!(!lock
            .acquire("lock:order:1", "holder-a", Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_holder_cannot_release_new_holder() {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(Arc::clone(&store));

        let first = lock
            .try_lock("lock:shop:7", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        let second = lock
            .try_lock("lock:shop:7", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        let second_holder = second.holder_id().to_string();

        assert!(!lock.unlock(first).await.unwrap());
        assert_eq!(
            store.get("lock:shop:7").await.unwrap(),
            Some(second_holder)
        );
        assert!(lock.unlock(second).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_keeps_lock_past_lease() {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(Arc::clone(&store));

        let handle = lock
            .try_lock_with_watchdog("lock:order:9", Duration::from_millis(300))
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_renewed());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            store.get("lock:order:9").await.unwrap().as_deref(),
            Some(handle.holder_id())
        );

        assert!(lock.unlock(handle).await.unwrap());
        assert_eq!(store.get("lock:order:9").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_renewal() {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(Arc::clone(&store));

        let handle = lock
            .try_lock_with_watchdog("lock:order:3", Duration::from_millis(300))
            .await
            .unwrap()
            .unwrap();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.get("lock:order:3").await.unwrap(), None);
    }
}
