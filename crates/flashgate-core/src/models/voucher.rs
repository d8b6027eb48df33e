//! Seckill voucher model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of an instant relative to a sale window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleWindow {
    NotStarted,
    Open,
    Ended,
}

/// Flash-sale voucher with limited stock and a sale window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeckillVoucher {
    /// Voucher this sale belongs to
    pub voucher_id: i64,

    /// Remaining stock; never negative
    pub stock: i32,

    /// Sale opens at
    pub begin_time: DateTime<Utc>,

    /// Sale closes at
    pub end_time: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub create_time: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub update_time: DateTime<Utc>,
}

impl SeckillVoucher {
    pub fn new(
        voucher_id: i64,
        stock: i32,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            voucher_id,
            stock,
            begin_time,
            end_time,
            create_time: now,
            update_time: now,
        }
    }

    /// Where `now` falls relative to the sale window
    pub fn window_at(&self, now: DateTime<Utc>) -> SaleWindow {
        if now < self.begin_time {
            SaleWindow::NotStarted
        } else if now > self.end_time {
            SaleWindow::Ended
        } else {
            SaleWindow::Open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_window_at() {
        let now = Utc::now();
        let voucher = SeckillVoucher::new(1, 10, now, now + Duration::hours(1));

        assert_eq!(voucher.window_at(now - Duration::seconds(1)), SaleWindow::NotStarted);
        assert_eq!(voucher.window_at(now), SaleWindow::Open);
        assert_eq!(voucher.window_at(now + Duration::hours(2)), SaleWindow::Ended);
    }
}
