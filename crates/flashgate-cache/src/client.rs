//! Cache-aside client
//!
//! Reads go to the store first and fall back to a caller-supplied loader on a
//! miss. Three strategies cover the classic failure modes:
//!
//! - **pass-through**: absent entities are cached as an empty string so repeated
//!   lookups of ids that do not exist stop reaching the loader
//! - **mutex**: on a miss only the holder of `lock:{entity}:{id}` runs the loader;
//!   everyone else retries the cache
//! - **logical expire**: entries never expire in the store; a stale entry is
//!   served immediately while one background rebuild refreshes it
//!
//! Every physical TTL written for a present value is jittered so keys written
//! together do not expire together. The absent sentinel keeps its short TTL
//! as configured.

use crate::keys;
use crate::lock::DistributedLock;
use crate::pool::RebuildPool;
use chrono::{DateTime, Utc};
use flashgate_core::config::CacheConfig;
use flashgate_core::error::AppError;
use flashgate_core::traits::CacheService;
use flashgate_core::AppResult;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Largest number of units added to a TTL on write
pub const MAX_JITTER: u64 = 9;

/// Stored value marking a known-absent entity
const ABSENT_SENTINEL: &str = "";

/// Current envelope layout
const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Seconds,
    Minutes,
}

/// A TTL in whole units; jitter is added in the same unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub amount: u64,
    pub unit: TtlUnit,
}

impl CacheTtl {
    pub fn seconds(amount: u64) -> Self {
        Self {
            amount,
            unit: TtlUnit::Seconds,
        }
    }

    pub fn minutes(amount: u64) -> Self {
        Self {
            amount,
            unit: TtlUnit::Minutes,
        }
    }

    pub fn as_duration(&self) -> Duration {
        match self.unit {
            TtlUnit::Seconds => Duration::from_secs(self.amount),
            TtlUnit::Minutes => Duration::from_secs(self.amount * 60),
        }
    }

    /// Nominal TTL plus a uniform 0..=9 units
    pub fn jittered(&self) -> Duration {
        let extra = rand::thread_rng().gen_range(0..=MAX_JITTER);
        Self {
            amount: self.amount + extra,
            unit: self.unit,
        }
        .as_duration()
    }
}

/// Wrapper stored under logical-expire keys
///
/// `logical_expire_at` of `None` never goes stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope<T> {
    #[serde(default = "envelope_version")]
    pub version: u32,
    pub data: T,
    pub logical_expire_at: Option<DateTime<Utc>>,
}

fn envelope_version() -> u32 {
    ENVELOPE_VERSION
}

impl<T> CacheEnvelope<T> {
    pub fn new(data: T, logical_expire_at: DateTime<Utc>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            data,
            logical_expire_at: Some(logical_expire_at),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.logical_expire_at.is_some_and(|at| at <= now)
    }
}

/// Tunables of the client
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// TTL of the absent sentinel
    pub null_ttl: CacheTtl,
    /// Expiry of rebuild locks
    pub lock_ttl: Duration,
    /// Sleep between mutex attempts
    pub retry_delay: Duration,
    /// Upper bound on mutex attempts
    pub max_attempts: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            null_ttl: CacheTtl::minutes(config.null_ttl_minutes),
            lock_ttl: config.lock_ttl(),
            retry_delay: config.retry_delay(),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Absent,
    Miss,
}

pub struct CacheClient<C> {
    store: Arc<C>,
    lock: DistributedLock<C>,
    pool: RebuildPool,
    options: CacheOptions,
}

impl<C> Clone for CacheClient<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            pool: self.pool.clone(),
            options: self.options.clone(),
        }
    }
}

impl<C: CacheService + 'static> CacheClient<C> {
    pub fn new(store: Arc<C>, pool: RebuildPool, options: CacheOptions) -> Self {
        Self {
            lock: DistributedLock::new(Arc::clone(&store)),
            store,
            pool,
            options,
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Serialize `value` and store it with a jittered TTL
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: CacheTtl,
    ) -> AppResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, Some(ttl.jittered())).await
    }

    /// Store `value` in an envelope that goes stale after `expire_in`
    ///
    /// The key itself has no expiry.
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expire_in: Duration,
    ) -> AppResult<()> {
        write_envelope(self.store.as_ref(), key, value, expire_in).await
    }

    /// Drop the cached entry of `entity`/`id`
    pub async fn invalidate(&self, entity: &str, id: impl Display) -> AppResult<bool> {
        self.store.delete(&keys::cache_key(entity, id)).await
    }

    /// Look up with the absent sentinel and no rebuild coordination
    pub async fn query_with_pass_through<T, ID, F, Fut>(
        &self,
        entity: &str,
        id: ID,
        loader: F,
        ttl: CacheTtl,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: Display,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        let key = keys::cache_key(entity, &id);
        match self.lookup::<T>(&key).await? {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        let loaded = loader(id).await?;
        self.write_loaded(&key, loaded.as_ref(), ttl).await?;
        Ok(loaded)
    }

    /// Look up; on a miss let only the rebuild-lock holder run the loader
    ///
    /// # Errors
    ///
    /// `AppError::CacheRebuildContended` when the lock is still held by someone
    /// else after `max_attempts` lookups.
    pub async fn query_with_mutex<T, ID, F, Fut>(
        &self,
        entity: &str,
        id: ID,
        loader: F,
        ttl: CacheTtl,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: Display,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        let key = keys::cache_key(entity, &id);
        let lock_key = keys::lock_key(entity, &id);

        for attempt in 1..=self.options.max_attempts {
            match self.lookup::<T>(&key).await? {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::Absent => return Ok(None),
                Lookup::Miss => {}
            }

            if let Some(handle) = self.lock.try_lock(&lock_key, self.options.lock_ttl).await? {
                let result = self.rebuild_under_lock(&key, id, loader, ttl).await;
                if let Err(e) = self.lock.unlock(handle).await {
                    warn!("Failed to release {}: {}", lock_key, e);
                }
                return result;
            }

            debug!("Rebuild of {} in progress, attempt {}", key, attempt);
            tokio::time::sleep(self.options.retry_delay).await;
        }

        warn!(
            "Gave up on {} after {} attempts",
            key, self.options.max_attempts
        );
        Err(AppError::CacheRebuildContended {
            key,
            attempts: self.options.max_attempts,
        })
    }

    /// Serve logical-expire entries without blocking on the loader
    ///
    /// A missing key is a miss and returns `None` without loading; these keys
    /// are expected to be warmed ahead of time. A stale entry is returned as is
    /// and, if this caller wins the rebuild lock, refreshed on the pool.
    pub async fn query_with_logical_expire<T, ID, F, Fut>(
        &self,
        entity: &str,
        id: ID,
        loader: F,
        expire_in: Duration,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        ID: Display + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<Option<T>>> + Send + 'static,
    {
        let key = keys::cache_key(entity, &id);
        let Some(envelope) = self.read_envelope::<T>(&key).await? else {
            return Ok(None);
        };
        if !envelope.is_expired_at(Utc::now()) {
            return Ok(Some(envelope.data));
        }

        let lock_key = keys::lock_key(entity, &id);
        let handle = match self.lock.try_lock(&lock_key, self.options.lock_ttl).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return Ok(Some(envelope.data)),
            Err(e) => {
                warn!("Could not try rebuild lock {}: {}", lock_key, e);
                return Ok(Some(envelope.data));
            }
        };

        let holder_id = handle.holder_id().to_string();
        let store = Arc::clone(&self.store);
        let lock = self.lock.clone();
        let rebuild_key = key.clone();

        let job = async move {
            match rebuild_logical::<C, T, ID, F, Fut>(&store, &rebuild_key, id, loader, expire_in)
                .await
            {
                Ok(()) => debug!("Rebuilt {}", rebuild_key),
                Err(e) => error!("Rebuild of {} failed: {}", rebuild_key, e),
            }
            if let Err(e) = lock.unlock(handle).await {
                warn!("Failed to release rebuild lock of {}: {}", rebuild_key, e);
            }
        };

        if let Err(e) = self.pool.submit(job) {
            warn!("Rebuild of {} not scheduled: {}", key, e);
            if let Err(e) = self.lock.release(&lock_key, &holder_id).await {
                warn!("Failed to release {}: {}", lock_key, e);
            }
        }

        Ok(Some(envelope.data))
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> AppResult<Lookup<T>> {
        match self.store.get(key).await? {
            None => {
                debug!("Cache MISS: {}", key);
                Ok(Lookup::Miss)
            }
            Some(raw) if raw == ABSENT_SENTINEL => {
                debug!("Cache ABSENT: {}", key);
                Ok(Lookup::Absent)
            }
            Some(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("Cache HIT: {}", key);
                    Ok(Lookup::Hit(value))
                }
                Err(e) => {
                    warn!("Discarding unreadable entry {}: {}", key, e);
                    self.store.delete(key).await?;
                    Ok(Lookup::Miss)
                }
            },
        }
    }

    async fn read_envelope<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> AppResult<Option<CacheEnvelope<T>>> {
        let raw = match self.store.get(key).await? {
            Some(raw) if raw != ABSENT_SENTINEL => raw,
            _ => {
                debug!("Cache MISS: {}", key);
                return Ok(None);
            }
        };

        match serde_json::from_str::<CacheEnvelope<T>>(&raw) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                warn!("Discarding unreadable envelope {}: {}", key, e);
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }

    async fn write_loaded<T: Serialize>(
        &self,
        key: &str,
        loaded: Option<&T>,
        ttl: CacheTtl,
    ) -> AppResult<()> {
        match loaded {
            Some(value) => self.set(key, value, ttl).await,
            None => {
                self.store
                    .set(key, ABSENT_SENTINEL, Some(self.options.null_ttl.as_duration()))
                    .await
            }
        }
    }

    async fn rebuild_under_lock<T, ID, F, Fut>(
        &self,
        key: &str,
        id: ID,
        loader: F,
        ttl: CacheTtl,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        // Another holder may have finished between our miss and our lock
        match self.lookup::<T>(key).await? {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        let loaded = loader(id).await?;
        self.write_loaded(key, loaded.as_ref(), ttl).await?;
        Ok(loaded)
    }
}

async fn write_envelope<C: CacheService + ?Sized, T: Serialize>(
    store: &C,
    key: &str,
    value: &T,
    expire_in: Duration,
) -> AppResult<()> {
    let expire_in = chrono::Duration::from_std(expire_in)
        .map_err(|e| AppError::Internal(format!("logical expiry out of range: {}", e)))?;
    let envelope = CacheEnvelope::new(value, Utc::now() + expire_in);
    let json = serde_json::to_string(&envelope)?;
    store.set(key, &json, None).await
}

async fn rebuild_logical<C, T, ID, F, Fut>(
    store: &Arc<C>,
    key: &str,
    id: ID,
    loader: F,
    expire_in: Duration,
) -> AppResult<()>
where
    C: CacheService,
    T: Serialize + DeserializeOwned,
    F: FnOnce(ID) -> Fut,
    Fut: Future<Output = AppResult<Option<T>>>,
{
    // Skip if a previous holder already refreshed the entry
    if let Some(raw) = store.get(key).await? {
        if let Ok(current) = serde_json::from_str::<CacheEnvelope<T>>(&raw) {
            if !current.is_expired_at(Utc::now()) {
                return Ok(());
            }
        }
    }

    match loader(id).await? {
        Some(value) => write_envelope(store.as_ref(), key, &value, expire_in).await,
        None => {
            store.delete(key).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_units() {
        assert_eq!(CacheTtl::seconds(5).as_duration(), Duration::from_secs(5));
        assert_eq!(CacheTtl::minutes(2).as_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let ttl = CacheTtl::minutes(30);
        for _ in 0..500 {
            let jittered = ttl.jittered();
            assert!(jittered >= Duration::from_secs(30 * 60));
            assert!(jittered <= Duration::from_secs(39 * 60));
        }
    }

    #[test]
    fn test_envelope_expiry() {
        let now = Utc::now();
        let fresh = CacheEnvelope::new(1, now + chrono::Duration::seconds(10));
        let stale = CacheEnvelope::new(1, now - chrono::Duration::seconds(1));

        assert!(!fresh.is_expired_at(now));
        assert!(stale.is_expired_at(now));

        let forever: CacheEnvelope<i32> =
            serde_json::from_str(r#"{"data":1,"logicalExpireAt":null}"#).unwrap();
        assert_eq!(forever.version, ENVELOPE_VERSION);
        assert!(!forever.is_expired_at(now));
    }

    #[test]
    fn test_envelope_wire_format() {
        let at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(CacheEnvelope::new("x", at)).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["data"], "x");
        assert!(json["logicalExpireAt"].is_string());
    }
}
