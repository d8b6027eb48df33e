//! In-process store
//!
//! Implements the same store traits as [`crate::RedisStore`] on plain maps
//! behind one mutex, so every trait operation is atomic the way a single Redis
//! command or script is. Expiry is lazy and uses Tokio's clock, which lets
//! tests pause time. Used for tests and for running without infrastructure.

use crate::keys;
use async_trait::async_trait;
use flashgate_core::error::{AppError, RejectReason};
use flashgate_core::models::{
    AdmissionResult, ConsumerId, QueueEntry, ReadOffset, SeckillVoucher, VoucherOrder,
};
use flashgate_core::traits::{AdmissionRequest, CacheService, OrderStream, SeckillGate};
use flashgate_core::AppResult;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct GroupState {
    /// Number of stream entries already handed out to the group
    delivered: usize,
    /// Unacknowledged entries: sequence -> consumer
    pending: BTreeMap<u64, String>,
}

#[derive(Default)]
struct MemoryStream {
    entries: Vec<(u64, HashMap<String, String>)>,
    last_sequence: u64,
    groups: HashMap<String, GroupState>,
}

impl MemoryStream {
    fn append(&mut self, fields: HashMap<String, String>) -> String {
        self.last_sequence += 1;
        self.entries.push((self.last_sequence, fields));
        entry_id(self.last_sequence)
    }

    fn fields_of(&self, sequence: u64) -> HashMap<String, String> {
        self.entries
            .binary_search_by_key(&sequence, |(seq, _)| *seq)
            .map(|index| self.entries[index].1.clone())
            .unwrap_or_default()
    }
}

fn entry_id(sequence: u64) -> String {
    format!("{}-0", sequence)
}

fn parse_entry_id(id: &str) -> AppResult<u64> {
    id.split('-')
        .next()
        .and_then(|ms| ms.parse::<u64>().ok())
        .ok_or_else(|| AppError::Queue(format!("Invalid stream ID specified: {}", id)))
}

fn no_group(stream: &str, group: &str) -> AppError {
    AppError::QueueGroupMissing(format!("{} on {}", group, stream))
}

#[derive(Default)]
struct State {
    strings: HashMap<String, StringEntry>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    streams: HashMap<String, MemoryStream>,
}

impl State {
    /// The live entry under `key`, evicting it first if it has expired
    fn live(&mut self, key: &str) -> Option<&mut StringEntry> {
        if self
            .strings
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()))
        {
            self.strings.remove(key);
        }
        self.strings.get_mut(key)
    }

    fn read_group(
        &mut self,
        stream: &str,
        consumer: &ConsumerId,
        offset: &ReadOffset,
        count: usize,
    ) -> AppResult<Vec<QueueEntry>> {
        let count = if count == 0 { usize::MAX } else { count };
        let state = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, &consumer.group))?;
        let group = state
            .groups
            .get_mut(&consumer.group)
            .ok_or_else(|| no_group(stream, &consumer.group))?;

        match offset {
            ReadOffset::LastConsumed => {
                let start = group.delivered;
                let end = start.saturating_add(count).min(state.entries.len());
                let mut delivered = Vec::with_capacity(end - start);
                for (sequence, fields) in &state.entries[start..end] {
                    group.pending.insert(*sequence, consumer.consumer.clone());
                    delivered.push(QueueEntry {
                        entry_id: entry_id(*sequence),
                        fields: fields.clone(),
                    });
                }
                group.delivered = end;
                Ok(delivered)
            }
            ReadOffset::Pending(after) => {
                let after = parse_entry_id(after)?;
                let sequences: Vec<u64> = group
                    .pending
                    .range((Bound::Excluded(after), Bound::Unbounded))
                    .filter(|(_, owner)| **owner == consumer.consumer)
                    .map(|(sequence, _)| *sequence)
                    .take(count)
                    .collect();
                Ok(sequences
                    .into_iter()
                    .map(|sequence| QueueEntry {
                        entry_id: entry_id(sequence),
                        fields: state.fields_of(sequence),
                    })
                    .collect())
            }
        }
    }
}

/// Store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    appended: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries ever appended to `stream`
    pub fn stream_len(&self, stream: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }

    /// Number of delivered but unacknowledged entries of `group`
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Drop a consumer group with its pending list, as `XGROUP DESTROY` does
    pub fn destroy_group(&self, stream: &str, group: &str) -> bool {
        self.state
            .lock()
            .streams
            .get_mut(stream)
            .is_some_and(|s| s.groups.remove(group).is_some())
    }

    /// Remaining admission stock of a published voucher
    pub fn stock(&self, voucher_id: i64) -> Option<i64> {
        self.state
            .lock()
            .live(&keys::seckill_stock_key(voucher_id))
            .and_then(|entry| entry.value.parse().ok())
    }
}

#[async_trait]
impl CacheService for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.state.lock().live(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        self.state.lock().strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        let existed = state.live(key).is_some();
        state.strings.remove(key);
        Ok(existed)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        let matches = state.live(key).is_some_and(|entry| entry.value == expected);
        if matches {
            state.strings.remove(key);
        }
        Ok(matches)
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        match state.live(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        let mut state = self.state.lock();
        // Evict an expired value so it restarts from zero
        state.live(key);
        let entry = state
            .strings
            .entry(key.to_string())
            .or_insert_with(|| StringEntry {
                value: "0".to_string(),
                expires_at: None,
            });
        let next = entry
            .value
            .parse::<i64>()
            .map_err(|_| AppError::Cache(format!("value at {} is not an integer", key)))?
            + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let mut state = self.state.lock();
        Ok(state
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }
}

#[async_trait]
impl OrderStream for MemoryStore {
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), AppError> {
        self.state
            .lock()
            .streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn append(&self, stream: &str, order: &VoucherOrder) -> Result<String, AppError> {
        let fields = order
            .to_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        let entry_id = self
            .state
            .lock()
            .streams
            .entry(stream.to_string())
            .or_default()
            .append(fields);
        self.appended.notify_waiters();
        Ok(entry_id)
    }

    async fn read_group(
        &self,
        stream: &str,
        consumer: &ConsumerId,
        offset: ReadOffset,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        let deadline = block.map(|block| Instant::now() + block);

        loop {
            // Register before looking so an append in between still wakes us
            let appended = self.appended.notified();
            {
                let mut state = self.state.lock();
                let entries = state.read_group(stream, consumer, &offset, count)?;
                if !entries.is_empty() || matches!(offset, ReadOffset::Pending(_)) {
                    return Ok(entries);
                }
            }

            let Some(deadline) = deadline else {
                return Ok(Vec::new());
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            if tokio::time::timeout(deadline - now, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<(), AppError> {
        let sequence = parse_entry_id(entry_id)?;
        let mut state = self.state.lock();
        if let Some(group) = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        {
            group.pending.remove(&sequence);
        }
        Ok(())
    }
}

#[async_trait]
impl SeckillGate for MemoryStore {
    async fn publish(&self, voucher: &SeckillVoucher) -> Result<(), AppError> {
        let mut state = self.state.lock();
        state.strings.insert(
            keys::seckill_stock_key(voucher.voucher_id),
            StringEntry {
                value: voucher.stock.to_string(),
                expires_at: None,
            },
        );
        let window = state
            .hashes
            .entry(keys::seckill_window_key(voucher.voucher_id))
            .or_default();
        window.insert(
            keys::WINDOW_BEGIN_FIELD.to_string(),
            voucher.begin_time.timestamp().to_string(),
        );
        window.insert(
            keys::WINDOW_END_FIELD.to_string(),
            voucher.end_time.timestamp().to_string(),
        );
        Ok(())
    }

    async fn admit(
        &self,
        stream: &str,
        request: &AdmissionRequest,
    ) -> Result<AdmissionResult, AppError> {
        let stock_key = keys::seckill_stock_key(request.voucher_id);
        let order_key = keys::seckill_order_key(request.voucher_id);
        let user = request.user_id.to_string();
        let now = request.now.timestamp();

        let result = {
            let mut state = self.state.lock();

            let window = state.hashes.get(&keys::seckill_window_key(request.voucher_id));
            let bound = |field: &str| {
                window
                    .and_then(|w| w.get(field))
                    .and_then(|v| v.parse::<i64>().ok())
            };
            let (begin, end) = (bound(keys::WINDOW_BEGIN_FIELD), bound(keys::WINDOW_END_FIELD));

            let stock = state
                .live(&stock_key)
                .and_then(|entry| entry.value.parse::<i64>().ok());

            if begin.is_some_and(|begin| now < begin) {
                AdmissionResult::Rejected(RejectReason::NotStarted)
            } else if end.is_some_and(|end| now > end) {
                AdmissionResult::Rejected(RejectReason::Ended)
            } else if state.sets.get(&order_key).is_some_and(|s| s.contains(&user)) {
                AdmissionResult::Rejected(RejectReason::Duplicate)
            } else if stock.map_or(true, |stock| stock <= 0) {
                AdmissionResult::Rejected(RejectReason::NoStock)
            } else {
                let remaining = stock.unwrap_or(0) - 1;
                if let Some(entry) = state.live(&stock_key) {
                    entry.value = remaining.to_string();
                }
                state.sets.entry(order_key).or_default().insert(user);

                let order = VoucherOrder::new(
                    request.order_id,
                    request.user_id,
                    request.voucher_id,
                    request.now,
                );
                let fields = order
                    .to_fields()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect();
                state
                    .streams
                    .entry(stream.to_string())
                    .or_default()
                    .append(fields);
                AdmissionResult::Admitted
            }
        };

        if result == AdmissionResult::Admitted {
            self.appended.notify_waiters();
        }
        debug!(
            "Admission voucher={} user={} -> {:?}",
            request.voucher_id, request.user_id, result
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_values_expire_lazily() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("n").await.unwrap(), 1);
        assert_eq!(store.incr("n").await.unwrap(), 2);

        store.set("text", "abc", None).await.unwrap();
        assert!(store.incr("text").await.is_err());
    }

    #[tokio::test]
    async fn test_read_requires_group() {
        let store = MemoryStore::new();
        let consumer = ConsumerId::new("g1", "c1");

        let result = store
            .read_group("s", &consumer, ReadOffset::LastConsumed, 1, None)
            .await;
        assert!(matches!(result, Err(AppError::QueueGroupMissing(_))));
    }

    #[tokio::test]
    async fn test_destroyed_group_drops_pending_entries() {
        let store = MemoryStore::new();
        let consumer = ConsumerId::new("g1", "c1");
        store.create_group("s", "g1").await.unwrap();
        store
            .append("s", &VoucherOrder::new(1, 7, 9, chrono::Utc::now()))
            .await
            .unwrap();
        store
            .read_group("s", &consumer, ReadOffset::LastConsumed, 1, None)
            .await
            .unwrap();
        assert_eq!(store.pending_count("s", "g1"), 1);

        assert!(store.destroy_group("s", "g1"));
        assert!(!store.destroy_group("s", "g1"));
        assert_eq!(store.pending_count("s", "g1"), 0);

        let result = store
            .read_group("s", &consumer, ReadOffset::pending(), 1, None)
            .await;
        assert!(matches!(result, Err(AppError::QueueGroupMissing(_))));
    }

    #[tokio::test]
    async fn test_pending_entries_belong_to_their_consumer() {
        let store = MemoryStore::new();
        let c1 = ConsumerId::new("g1", "c1");
        let c2 = ConsumerId::new("g1", "c2");
        store.create_group("s", "g1").await.unwrap();

        let order = VoucherOrder::new(1, 1, 1, chrono::Utc::now());
        store.append("s", &order).await.unwrap();
        store.append("s", &order).await.unwrap();

        let first = store
            .read_group("s", &c1, ReadOffset::LastConsumed, 1, None)
            .await
            .unwrap();
        let second = store
            .read_group("s", &c2, ReadOffset::LastConsumed, 1, None)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].entry_id, second[0].entry_id);

        let pending = store
            .read_group("s", &c1, ReadOffset::pending(), 10, None)
            .await
            .unwrap();
        assert_eq!(pending, first);
        assert_eq!(store.pending_count("s", "g1"), 2);

        store.acknowledge("s", "g1", &first[0].entry_id).await.unwrap();
        assert_eq!(store.pending_count("s", "g1"), 1);
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_on_append() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let consumer = ConsumerId::new("g1", "c1");
        store.create_group("s", "g1").await.unwrap();

        let reader = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .read_group(
                        "s",
                        &consumer,
                        ReadOffset::LastConsumed,
                        1,
                        Some(Duration::from_secs(5)),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let order = VoucherOrder::new(9, 1, 1, chrono::Utc::now());
        store.append("s", &order).await.unwrap();

        let entries = reader.await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order().unwrap().id, 9);
    }
}
