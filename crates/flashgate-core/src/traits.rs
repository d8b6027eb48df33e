//! Common traits for the external store and the relational repositories
//!
//! Every cross-task coordination primitive lives behind these seams so the
//! same services run against Redis/PostgreSQL in production and against the
//! in-memory implementations in tests.

use crate::error::AppError;
use crate::models::{
    AdmissionResult, ConsumerId, PersistOutcome, QueueEntry, ReadOffset, SeckillVoucher, Shop,
    VoucherOrder,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Key/value operations of the external store
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get the raw string stored under `key`
    ///
    /// `Ok(Some(""))` is a stored empty string and is distinct from `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Set `key`, with an expiry when `ttl` is given
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError>;

    /// Set `key` only if absent, with expiry; returns whether the key was written
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AppError>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Atomically delete `key` only if its value equals `expected`
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, AppError>;

    /// Atomically reset the expiry of `key` only if its value equals `expected`
    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, AppError>;

    /// Atomically increment an integer key, creating it at 0 first
    async fn incr(&self, key: &str) -> Result<i64, AppError>;

    /// Remaining time to live; `None` when the key is missing or never expires
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError>;
}

/// Durable ordered queue with consumer groups
#[async_trait]
pub trait OrderStream: Send + Sync {
    /// Create the consumer group (and the stream) if they do not exist yet
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), AppError>;

    /// Append an order; returns the queue-assigned entry id
    async fn append(&self, stream: &str, order: &VoucherOrder) -> Result<String, AppError>;

    /// Read up to `count` entries for a consumer
    ///
    /// With `block` set and nothing available, waits at most that long.
    async fn read_group(
        &self,
        stream: &str,
        consumer: &ConsumerId,
        offset: ReadOffset,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<QueueEntry>, AppError>;

    /// Mark an entry as handled, removing it from the pending list
    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str)
        -> Result<(), AppError>;
}

/// Inputs of one admission attempt
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub voucher_id: i64,
    pub user_id: i64,
    pub order_id: i64,
    pub now: DateTime<Utc>,
}

/// Server-side atomic admission for flash sales
#[async_trait]
pub trait SeckillGate: Send + Sync {
    /// Seed stock and sale window so admission can run against them
    async fn publish(&self, voucher: &SeckillVoucher) -> Result<(), AppError>;

    /// In one indivisible step: check window, stock and duplicate; on success
    /// decrement stock, record the subject and append the order to `stream`
    async fn admit(
        &self,
        stream: &str,
        request: &AdmissionRequest,
    ) -> Result<AdmissionResult, AppError>;
}

/// Shop repository
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// Find shop by ID
    async fn find_by_id(&self, id: i64) -> Result<Option<Shop>, AppError>;

    /// Update an existing shop; returns whether a row matched
    async fn update(&self, shop: &Shop) -> Result<bool, AppError>;
}

/// Seckill voucher repository
#[async_trait]
pub trait VoucherRepository: Send + Sync {
    /// Insert a seckill voucher
    async fn create_seckill(&self, voucher: &SeckillVoucher) -> Result<SeckillVoucher, AppError>;

    /// Find seckill voucher by voucher ID
    async fn find_seckill(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>, AppError>;
}

/// Voucher order repository
#[async_trait]
pub trait VoucherOrderRepository: Send + Sync {
    /// Authoritative order write, all in one transaction:
    /// duplicate check, conditional `stock > 0` decrement, insert
    async fn create_voucher_order(&self, order: &VoucherOrder)
        -> Result<PersistOutcome, AppError>;
}
