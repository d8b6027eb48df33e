//! Redis coordination layer for Flashgate
//!
//! Everything that must be consistent across service instances goes through
//! the external store: cache-aside entries, distributed locks, the daily ID
//! counters, flash-sale stock and the order stream. [`RedisStore`] is the
//! production implementation of the store traits from flashgate-core and
//! [`memory::MemoryStore`] is an in-process stand-in with the same semantics.
//!
//! On top of the store sit the components the services use:
//!
//! - [`CacheClient`] - cache-aside reads with pass-through, mutex and logical-expire strategies
//! - [`DistributedLock`] - identity-checked lock with optional lease renewal
//! - [`IdWorker`] - time-ordered 64-bit ids from a daily counter
//! - [`RebuildPool`] - bounded workers for background cache rebuilds
//!
//! # Example
//!
//! ```no_run
//! use flashgate_cache::RedisStore;
//! use flashgate_core::traits::CacheService;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedisStore::new("redis://127.0.0.1:6379").await?;
//!
//!     store.set("my_key", "my_value", Some(Duration::from_secs(60))).await?;
//!     assert_eq!(store.get("my_key").await?, Some("my_value".to_string()));
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod id_worker;
pub mod keys;
pub mod lock;
pub mod memory;
pub mod pool;
pub mod scripts;
mod seckill;
mod stream;

pub use client::{CacheClient, CacheEnvelope, CacheOptions, CacheTtl, TtlUnit};
pub use id_worker::IdWorker;
pub use lock::{DistributedLock, LockHandle};
pub use memory::MemoryStore;
pub use pool::RebuildPool;

use async_trait::async_trait;
use flashgate_core::error::AppError;
use flashgate_core::traits::CacheService;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, Script};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Redis store with a multiplexed connection
///
/// Clones share the underlying connection. Blocking stream reads stall every
/// command multiplexed on the same connection, so the order consumer gets a
/// store of its own (see [`RedisStore::new`]).
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    unlock_script: Script,
    renew_script: Script,
    seckill_script: Script,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the URL is invalid or the
    /// connection cannot be established
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self {
            manager,
            unlock_script: Script::new(scripts::UNLOCK_SCRIPT),
            renew_script: Script::new(scripts::RENEW_SCRIPT),
            seckill_script: Script::new(scripts::SECKILL_SCRIPT),
        })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Flush all keys from the current database
    #[cfg(test)]
    pub async fn flush_db(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to flush database: {}", e);
                AppError::Cache(format!("Flush failed: {}", e))
            })?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Convert RedisError to AppError
    pub(crate) fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheService for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.connection();

        let value: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let mut conn = self.connection();

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        match ttl {
            Some(ttl) => {
                debug!("SET {} (TTL: {}ms)", key, ttl.as_millis());
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            None => debug!("SET {}", key),
        }

        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AppError> {
        debug!("SET NX {} (TTL: {}ms)", key, ttl.as_millis());
        let mut conn = self.connection();

        // SET NX replies OK when written and nil when the key already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.connection();

        let deleted: i64 = conn.del(key).await.map_err(Self::map_redis_error)?;
        Ok(deleted > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, AppError> {
        debug!("DEL {} IF {}", key, expected);
        let mut conn = self.connection();

        let deleted: i64 = self
            .unlock_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(deleted > 0)
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        debug!("PEXPIRE {} {}ms IF {}", key, ttl.as_millis(), expected);
        let mut conn = self.connection();

        let renewed: i64 = self
            .renew_script
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(renewed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        debug!("INCR {}", key);
        let mut conn = self.connection();

        let value: i64 = conn.incr(key, 1i64).await.map_err(Self::map_redis_error)?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let mut conn = self.connection();

        // -2: no such key, -1: no expiry
        let millis: i64 = conn.pttl(key).await.map_err(Self::map_redis_error)?;
        if millis < 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_millis(millis as u64)))
    }
}
