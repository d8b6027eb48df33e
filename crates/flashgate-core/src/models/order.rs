//! Voucher order and order-queue models
//!
//! An order moves through `REQUESTED -> ADMITTED -> QUEUED -> PERSISTED`, or ends
//! at `REJECTED(reason)` when the admission script refuses it.

use crate::error::{AppError, RejectReason};
use crate::AppResult;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Order payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Unpaid,
    Paid,
    Redeemed,
    Cancelled,
    Refunding,
    Refunded,
}

impl OrderStatus {
    /// Numeric code stored in the `status` column
    pub fn code(&self) -> i16 {
        match self {
            OrderStatus::Unpaid => 1,
            OrderStatus::Paid => 2,
            OrderStatus::Redeemed => 3,
            OrderStatus::Cancelled => 4,
            OrderStatus::Refunding => 5,
            OrderStatus::Refunded => 6,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Unpaid => write!(f, "unpaid"),
            OrderStatus::Paid => write!(f, "paid"),
            OrderStatus::Redeemed => write!(f, "redeemed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Refunding => write!(f, "refunding"),
            OrderStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// Voucher order entity
///
/// At most one order exists per `(user_id, voucher_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherOrder {
    /// Sequence id from the ID generator
    pub id: i64,

    /// Ordering subject
    pub user_id: i64,

    pub voucher_id: i64,

    #[serde(default)]
    pub status: OrderStatus,

    pub create_time: DateTime<Utc>,
}

/// Stream field names of an order payload
pub mod fields {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "userId";
    pub const VOUCHER_ID: &str = "voucherId";
    pub const CREATE_TIME: &str = "createTime";
}

impl VoucherOrder {
    pub fn new(id: i64, user_id: i64, voucher_id: i64, create_time: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            voucher_id,
            status: OrderStatus::Unpaid,
            create_time,
        }
    }

    /// Encode as flat stream fields; `createTime` is epoch seconds
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (fields::ID, self.id.to_string()),
            (fields::USER_ID, self.user_id.to_string()),
            (fields::VOUCHER_ID, self.voucher_id.to_string()),
            (fields::CREATE_TIME, self.create_time.timestamp().to_string()),
        ]
    }

    /// Decode from flat stream fields
    ///
    /// `createTime` is optional; entries written without it take the decode time.
    pub fn from_fields(map: &HashMap<String, String>) -> AppResult<Self> {
        fn required(map: &HashMap<String, String>, name: &str) -> AppResult<i64> {
            let raw = map
                .get(name)
                .ok_or_else(|| AppError::Serialization(format!("missing field {}", name)))?;
            raw.parse::<i64>().map_err(|e| {
                AppError::Serialization(format!("field {} is not an integer ({}): {}", name, raw, e))
            })
        }

        let create_time = match map.get(fields::CREATE_TIME) {
            Some(raw) => {
                let secs = raw.parse::<i64>().map_err(|e| {
                    AppError::Serialization(format!("field createTime is invalid: {}", e))
                })?;
                Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                    AppError::Serialization(format!("createTime out of range: {}", secs))
                })?
            }
            None => Utc::now(),
        };

        Ok(Self::new(
            required(map, fields::ID)?,
            required(map, fields::USER_ID)?,
            required(map, fields::VOUCHER_ID)?,
            create_time,
        ))
    }
}

/// Outcome of the atomic admission script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    Admitted,
    Rejected(RejectReason),
}

impl AdmissionResult {
    /// Map the script's integer result
    pub fn from_code(code: i64) -> AppResult<Self> {
        match code {
            0 => Ok(AdmissionResult::Admitted),
            1 => Ok(AdmissionResult::Rejected(RejectReason::NoStock)),
            2 => Ok(AdmissionResult::Rejected(RejectReason::Duplicate)),
            3 => Ok(AdmissionResult::Rejected(RejectReason::NotStarted)),
            4 => Ok(AdmissionResult::Rejected(RejectReason::Ended)),
            other => Err(AppError::Cache(format!(
                "unexpected admission script result: {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            AdmissionResult::Admitted => 0,
            AdmissionResult::Rejected(RejectReason::NoStock) => 1,
            AdmissionResult::Rejected(RejectReason::Duplicate) => 2,
            AdmissionResult::Rejected(RejectReason::NotStarted) => 3,
            AdmissionResult::Rejected(RejectReason::Ended) => 4,
        }
    }
}

/// A record delivered from the order stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Queue-assigned id, e.g. `1700000000000-0`
    pub entry_id: String,

    /// Raw payload fields
    pub fields: HashMap<String, String>,
}

impl QueueEntry {
    pub fn order(&self) -> AppResult<VoucherOrder> {
        VoucherOrder::from_fields(&self.fields)
    }
}

/// Identity of a consumer inside a consumer group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerId {
    pub group: String,
    pub consumer: String,
}

impl ConsumerId {
    pub fn new(group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            consumer: consumer.into(),
        }
    }
}

/// Where a consumer-group read starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOffset {
    /// Entries never delivered to any consumer of the group (`>`)
    LastConsumed,
    /// This consumer's unacknowledged entries with ids after the given one (`0` = all)
    Pending(String),
}

impl ReadOffset {
    /// The whole pending list of the consumer
    pub fn pending() -> Self {
        ReadOffset::Pending("0".to_string())
    }

    pub fn as_stream_id(&self) -> &str {
        match self {
            ReadOffset::LastConsumed => ">",
            ReadOffset::Pending(id) => id,
        }
    }
}

/// Result of the authoritative order write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Stock decremented and the order row inserted
    Created,
    /// A row for the same (user, voucher) already exists; nothing written
    AlreadyExists,
    /// The conditional stock decrement matched no row; nothing written
    OutOfStock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_fields_round_trip() {
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let order = VoucherOrder::new(42, 7, 3, created);
        let map: HashMap<String, String> = order
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(VoucherOrder::from_fields(&map).unwrap(), order);
    }

    #[test]
    fn test_from_fields_rejects_garbage() {
        let mut map = HashMap::new();
        map.insert("id".to_string(), "abc".to_string());
        map.insert("userId".to_string(), "1".to_string());
        map.insert("voucherId".to_string(), "2".to_string());

        assert!(matches!(
            VoucherOrder::from_fields(&map),
            Err(AppError::Serialization(_))
        ));

        map.remove("id");
        assert!(VoucherOrder::from_fields(&map).is_err());
    }

    #[test]
    fn test_admission_codes() {
        assert_eq!(AdmissionResult::from_code(0).unwrap(), AdmissionResult::Admitted);
        assert_eq!(
            AdmissionResult::from_code(1).unwrap(),
            AdmissionResult::Rejected(RejectReason::NoStock)
        );
        assert_eq!(
            AdmissionResult::from_code(2).unwrap(),
            AdmissionResult::Rejected(RejectReason::Duplicate)
        );
        assert!(AdmissionResult::from_code(9).is_err());
        for code in 0..=4 {
            assert_eq!(AdmissionResult::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OrderStatus::default().code(), 1);
        assert_eq!(OrderStatus::Refunded.code(), 6);
    }

    #[test]
    fn test_read_offset() {
        assert_eq!(ReadOffset::LastConsumed.as_stream_id(), ">");
        assert_eq!(ReadOffset::pending().as_stream_id(), "0");
    }
}
