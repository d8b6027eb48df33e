//! Distributed lock on the external store
//!
//! A lock is a key written with set-if-absent and an expiry. The value is a
//! holder id unique across every process, and release only deletes the key
//! while it still carries that id, so a holder whose lease ran out can never
//! remove a lock that somebody else acquired in the meantime.

use flashgate_core::traits::CacheService;
use flashgate_core::AppResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use uuid::Uuid;

static PROCESS_ID: OnceLock<String> = OnceLock::new();
static HOLDER_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Shortest renewal period of the watchdog
const MIN_RENEW_PERIOD: Duration = Duration::from_millis(10);

/// Generate a holder id: `<process uuid>-<per-process sequence>`
pub fn next_holder_id() -> String {
    let process = PROCESS_ID.get_or_init(|| Uuid::new_v4().simple().to_string());
    let sequence = HOLDER_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{}", process, sequence)
}

/// Proof of a held lock
///
/// Dropping a handle stops its lease renewal but leaves the key to expire;
/// pass it to [`DistributedLock::unlock`] to release right away.
#[derive(Debug)]
pub struct LockHandle {
    key: String,
    holder_id: String,
    watchdog: Option<DropGuard>,
}

impl LockHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn is_renewed(&self) -> bool {
        self.watchdog.is_some()
    }
}

/// Identity-checked mutual exclusion across processes
pub struct DistributedLock<C> {
    store: Arc<C>,
}

impl<C> Clone for DistributedLock<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: CacheService + 'static> DistributedLock<C> {
    pub fn new(store: Arc<C>) -> Self {
        Self { store }
    }

    /// Set `key` to `holder_id` if absent, expiring after `timeout`
    ///
    /// Returns `false` when the lock is held by anyone, including `holder_id`.
    pub async fn acquire(&self, key: &str, holder_id: &str, timeout: Duration) -> AppResult<bool> {
        let acquired = self.store.set_nx(key, holder_id, timeout).await?;
        debug!("Lock {} acquire by {}: {}", key, holder_id, acquired);
        Ok(acquired)
    }

    /// Delete `key` only if it still holds `holder_id`
    pub async fn release(&self, key: &str, holder_id: &str) -> AppResult<bool> {
        let released = self.store.delete_if_equals(key, holder_id).await?;
        if !released {
            debug!("Lock {} no longer held by {}", key, holder_id);
        }
        Ok(released)
    }

    /// Acquire with a fresh holder id
    pub async fn try_lock(&self, key: &str, timeout: Duration) -> AppResult<Option<LockHandle>> {
        let holder_id = next_holder_id();
        if !self.acquire(key, &holder_id, timeout).await? {
            return Ok(None);
        }

        Ok(Some(LockHandle {
            key: key.to_string(),
            holder_id,
            watchdog: None,
        }))
    }

    /// Acquire with a fresh holder id and renew the lease every `lease / 3`
    /// until the handle is unlocked or dropped
    ///
    /// Renewal stops on its own once the key no longer carries the holder id.
    pub async fn try_lock_with_watchdog(
        &self,
        key: &str,
        lease: Duration,
    ) -> AppResult<Option<LockHandle>> {
        let holder_id = next_holder_id();
        if !self.acquire(key, &holder_id, lease).await? {
            return Ok(None);
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let store = Arc::clone(&self.store);
        let renew_key = key.to_string();
        let renew_holder = holder_id.clone();
        let period = (lease / 3).max(MIN_RENEW_PERIOD);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.expire_if_equals(&renew_key, &renew_holder, lease).await {
                            Ok(true) => debug!("Renewed lock {} for {:?}", renew_key, lease),
                            Ok(false) => {
                                warn!("Lock {} lost before renewal", renew_key);
                                break;
                            }
                            Err(e) => warn!("Failed to renew lock {}: {}", renew_key, e),
                        }
                    }
                }
            }
        });

        Ok(Some(LockHandle {
            key: key.to_string(),
            holder_id,
            watchdog: Some(token.drop_guard()),
        }))
    }

    /// Stop renewal and release
    ///
    /// Returns `false` if the lock had already expired or changed hands.
    pub async fn unlock(&self, handle: LockHandle) -> AppResult<bool> {
        let LockHandle {
            key,
            holder_id,
            watchdog,
        } = handle;
        drop(watchdog);
        self.release(&key, &holder_id).await
    }
}
