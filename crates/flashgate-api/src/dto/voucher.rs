//! Seckill voucher and order DTOs

use chrono::{DateTime, Utc};
use flashgate_core::models::SeckillVoucher;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Body of `POST /vouchers/seckill`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_sale_window"))]
pub struct SeckillVoucherRequest {
    pub voucher_id: i64,

    /// Units on sale
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock: i32,

    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

fn validate_sale_window(req: &SeckillVoucherRequest) -> Result<(), ValidationError> {
    if req.end_time <= req.begin_time {
        let mut err = ValidationError::new("sale_window");
        err.message = Some("End time must be after begin time".into());
        return Err(err);
    }
    Ok(())
}

impl From<SeckillVoucherRequest> for SeckillVoucher {
    fn from(req: SeckillVoucherRequest) -> Self {
        SeckillVoucher::new(req.voucher_id, req.stock, req.begin_time, req.end_time)
    }
}

/// Result of an admitted seckill order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeckillOrderResponse {
    pub order_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_camel_case() {
        let req: SeckillVoucherRequest = serde_json::from_value(serde_json::json!({
            "voucherId": 3,
            "stock": 100,
            "beginTime": "2024-01-01T00:00:00Z",
            "endTime": "2024-01-02T00:00:00Z"
        }))
        .unwrap();

        let voucher = SeckillVoucher::from(req);
        assert_eq!(voucher.voucher_id, 3);
        assert_eq!(voucher.stock, 100);
        assert!(voucher.end_time > voucher.begin_time);
    }

    fn request(stock: i32, hours: i64) -> SeckillVoucherRequest {
        let begin = Utc::now();
        SeckillVoucherRequest {
            voucher_id: 1,
            stock,
            begin_time: begin,
            end_time: begin + chrono::Duration::hours(hours),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request(0, 1).validate().is_ok());
        assert!(request(100, 1).validate().is_ok());

        let errors = request(-1, 1).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("stock"));

        assert!(request(5, 0).validate().is_err());
        assert!(request(5, -1).validate().is_err());
    }
}
