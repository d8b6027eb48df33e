//! Time-ordered 64-bit id generator
//!
//! Layout: `(seconds since 2023-01-01T00:00:00Z) << 32 | daily counter`.
//! The counter lives in the external store under one key per prefix and UTC
//! day, so ids are unique across processes and increase with time.

use crate::keys;
use chrono::{DateTime, Utc};
use flashgate_core::traits::CacheService;
use flashgate_core::AppResult;
use std::sync::Arc;
use tracing::warn;

/// 2023-01-01T00:00:00Z in epoch seconds
pub const BEGIN_TIMESTAMP: i64 = 1_672_531_200;

/// Width of the counter part
pub const COUNT_BITS: u32 = 32;

const COUNT_MASK: i64 = (1 << COUNT_BITS) - 1;

/// Combine a timestamp offset and a counter into an id
pub fn compose(timestamp: i64, count: i64) -> i64 {
    (timestamp << COUNT_BITS) | (count & COUNT_MASK)
}

/// Split an id into `(timestamp offset, counter)`
pub fn decompose(id: i64) -> (i64, i64) {
    (id >> COUNT_BITS, id & COUNT_MASK)
}

/// Split an id and resolve the timestamp part to an instant
pub fn issued_at(id: i64) -> Option<DateTime<Utc>> {
    let (timestamp, _) = decompose(id);
    DateTime::from_timestamp(BEGIN_TIMESTAMP + timestamp, 0)
}

pub struct IdWorker<C> {
    store: Arc<C>,
}

impl<C> Clone for IdWorker<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: CacheService> IdWorker<C> {
    pub fn new(store: Arc<C>) -> Self {
        Self { store }
    }

    pub async fn next_id(&self, prefix: &str) -> AppResult<i64> {
        self.next_id_at(prefix, Utc::now()).await
    }

    /// Issue an id as of `now`
    pub async fn next_id_at(&self, prefix: &str, now: DateTime<Utc>) -> AppResult<i64> {
        let timestamp = now.timestamp() - BEGIN_TIMESTAMP;
        let key = keys::sequence_key(prefix, now.date_naive());

        let count = self.store.incr(&key).await?;
        if count > COUNT_MASK {
            warn!("Daily counter {} exceeded {} bits", key, COUNT_BITS);
        }

        Ok(compose(timestamp, count))
    }
}
