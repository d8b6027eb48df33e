//! Atomic flash-sale admission on Redis

use crate::{keys, RedisStore};
use async_trait::async_trait;
use flashgate_core::error::AppError;
use flashgate_core::models::{AdmissionResult, SeckillVoucher};
use flashgate_core::traits::{AdmissionRequest, SeckillGate};
use tracing::{debug, info};

#[async_trait]
impl SeckillGate for RedisStore {
    async fn publish(&self, voucher: &SeckillVoucher) -> Result<(), AppError> {
        let mut conn = self.connection();

        let _: () = redis::pipe()
            .atomic()
            .set(keys::seckill_stock_key(voucher.voucher_id), voucher.stock)
            .ignore()
            .hset_multiple(
                keys::seckill_window_key(voucher.voucher_id),
                &[
                    (keys::WINDOW_BEGIN_FIELD, voucher.begin_time.timestamp()),
                    (keys::WINDOW_END_FIELD, voucher.end_time.timestamp()),
                ],
            )
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        info!(
            "Published seckill voucher {} with stock {}",
            voucher.voucher_id, voucher.stock
        );
        Ok(())
    }

    async fn admit(
        &self,
        stream: &str,
        request: &AdmissionRequest,
    ) -> Result<AdmissionResult, AppError> {
        let mut conn = self.connection();

        let code: i64 = self
            .seckill_script
            .key(keys::seckill_stock_key(request.voucher_id))
            .key(keys::seckill_window_key(request.voucher_id))
            .key(keys::seckill_order_key(request.voucher_id))
            .key(stream)
            .arg(request.voucher_id)
            .arg(request.user_id)
            .arg(request.order_id)
            .arg(request.now.timestamp())
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        debug!(
            "Admission voucher={} user={} order={} -> {}",
            request.voucher_id, request.user_id, request.order_id, code
        );
        AdmissionResult::from_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use flashgate_core::error::RejectReason;
    use flashgate_core::models::{ConsumerId, ReadOffset};
    use flashgate_core::traits::OrderStream;

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_admit_enqueues_and_rejects_duplicate() {
        let store = RedisStore::new("redis://127.0.0.1:6379").await.unwrap();
        store.flush_db().await.unwrap();

        let now = Utc::now();
        let voucher = SeckillVoucher::new(10, 2, now - Duration::hours(1), now + Duration::hours(1));
        store.publish(&voucher).await.unwrap();
        store.create_group("stream.orders", "g1").await.unwrap();

        let request = AdmissionRequest {
            voucher_id: 10,
            user_id: 1,
            order_id: 100,
            now,
        };
        assert_eq!(
            store.admit("stream.orders", &request).await.unwrap(),
            AdmissionResult::Admitted
        );
        assert_eq!(
            store.admit("stream.orders", &request).await.unwrap(),
            AdmissionResult::Rejected(RejectReason::Duplicate)
        );

        let entries = store
            .read_group(
                "stream.orders",
                &ConsumerId::new("g1", "c1"),
                ReadOffset::LastConsumed,
                10,
                None,
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order().unwrap().id, 100);
    }
}
