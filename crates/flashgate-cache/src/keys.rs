//! Store key constants and builders for Flashgate
//!
//! Every key the workspace touches in the external store is built here so
//! the Redis implementation and the in-memory store agree on naming.
//!
//! # Key Patterns
//!
//! - `cache:{entity}:{id}` - Cache-aside entries (plain or logical-expire envelope)
//! - `lock:{entity}:{id}` - Distributed locks (rebuild mutex, per-subject order lock)
//! - `seq:{prefix}:{yyyy-mm-dd}` - Daily counters of the ID generator
//! - `rel:{kind}:{subject_id}` - Per-subject relation sets
//! - `seckill:stock:{voucher_id}` - Remaining flash-sale stock
//! - `seckill:window:{voucher_id}` - Hash with the sale window (`begin`, `end`, epoch seconds)
//! - `seckill:order:{voucher_id}` - Set of subjects that already ordered
//!
//! # Example
//!
//! ```
//! use flashgate_cache::keys;
//!
//! assert_eq!(keys::cache_key(keys::SHOP_ENTITY, 1), "cache:shop:1");
//! assert_eq!(keys::lock_key(keys::ORDER_ENTITY, 7), "lock:order:7");
//! ```

use chrono::NaiveDate;
use std::fmt::Display;

/// Prefix for cache-aside entries
pub const CACHE_PREFIX: &str = "cache";

/// Prefix for distributed locks
pub const LOCK_PREFIX: &str = "lock";

/// Prefix for ID generator counters
pub const SEQUENCE_PREFIX: &str = "seq";

/// Prefix for all flash-sale state
pub const SECKILL_PREFIX: &str = "seckill";

/// Entity name of shops
pub const SHOP_ENTITY: &str = "shop";

/// Entity name of voucher orders; also names the per-subject order lock
pub const ORDER_ENTITY: &str = "order";

/// Hash field holding the sale start inside the window key
pub const WINDOW_BEGIN_FIELD: &str = "begin";

/// Hash field holding the sale end inside the window key
pub const WINDOW_END_FIELD: &str = "end";

/// Build a cache key
///
/// Format: `cache:{entity}:{id}`
pub fn cache_key(entity: &str, id: impl Display) -> String {
    format!("{}:{}:{}", CACHE_PREFIX, entity, id)
}

/// Build a lock key
///
/// Format: `lock:{entity}:{id}`
///
/// # Example
///
/// ```
/// use flashgate_cache::keys::lock_key;
///
/// assert_eq!(lock_key("shop", 3), "lock:shop:3");
/// ```
pub fn lock_key(entity: &str, id: impl Display) -> String {
    format!("{}:{}:{}", LOCK_PREFIX, entity, id)
}

/// Build the counter key for one prefix and one UTC calendar day
///
/// Format: `seq:{prefix}:{yyyy-mm-dd}`
pub fn sequence_key(prefix: &str, day: NaiveDate) -> String {
    format!("{}:{}:{}", SEQUENCE_PREFIX, prefix, day.format("%Y-%m-%d"))
}

pub fn seckill_stock_key(voucher_id: i64) -> String {
    format!("{}:stock:{}", SECKILL_PREFIX, voucher_id)
}

pub fn seckill_window_key(voucher_id: i64) -> String {
    format!("{}:window:{}", SECKILL_PREFIX, voucher_id)
}

pub fn seckill_order_key(voucher_id: i64) -> String {
    format!("{}:order:{}", SECKILL_PREFIX, voucher_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_and_lock_keys() {
        assert_eq!(cache_key(SHOP_ENTITY, 1), "cache:shop:1");
        assert_eq!(cache_key("shop", "abc"), "cache:shop:abc");
        assert_eq!(lock_key(SHOP_ENTITY, 1), "lock:shop:1");
        assert_eq!(lock_key(ORDER_ENTITY, 42), "lock:order:42");
    }

    #[test]
    fn test_sequence_key_uses_calendar_day() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(sequence_key("order", day), "seq:order:2026-01-05");
    }

    #[test]
    fn test_seckill_keys() {
        assert_eq!(seckill_stock_key(9), "seckill:stock:9");
        assert_eq!(seckill_window_key(9), "seckill:window:9");
        assert_eq!(seckill_order_key(9), "seckill:order:9");
    }

    #[test]
    fn test_key_uniqueness() {
        let keys = vec![
            cache_key(SHOP_ENTITY, 1),
            lock_key(SHOP_ENTITY, 1),
            lock_key(ORDER_ENTITY, 1),
            seckill_stock_key(1),
            seckill_window_key(1),
            seckill_order_key(1),
            sequence_key(ORDER_ENTITY, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        ];

        let unique_count = keys.iter().collect::<std::collections::HashSet<_>>().len();
        assert_eq!(unique_count, keys.len());
    }
}
