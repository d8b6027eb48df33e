//! Seckill admission and voucher publishing

use chrono::Utc;
use flashgate_cache::IdWorker;
use flashgate_core::{
    config::SeckillConfig,
    models::{AdmissionResult, SeckillVoucher},
    traits::{AdmissionRequest, CacheService, SeckillGate, VoucherRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Request-path side of the flash sale
///
/// Admission is decided entirely by the atomic script behind `SeckillGate`;
/// the database is written later by the order consumer.
pub struct VoucherOrderService<G, C, V>
where
    G: SeckillGate,
    C: CacheService,
    V: VoucherRepository,
{
    gate: Arc<G>,
    id_worker: IdWorker<C>,
    voucher_repo: Arc<V>,
    config: SeckillConfig,
}

impl<G, C, V> VoucherOrderService<G, C, V>
where
    G: SeckillGate,
    C: CacheService,
    V: VoucherRepository,
{
    pub fn new(
        gate: Arc<G>,
        id_worker: IdWorker<C>,
        voucher_repo: Arc<V>,
        config: SeckillConfig,
    ) -> Self {
        Self {
            gate,
            id_worker,
            voucher_repo,
            config,
        }
    }

    /// Try to buy one unit of a seckill voucher
    ///
    /// Returns the order id as soon as the order is admitted and queued.
    ///
    /// # Errors
    ///
    /// `AppError::OrderRejected` with the script's reason; store failures as is.
    #[instrument(skip(self))]
    pub async fn seckill_voucher(&self, voucher_id: i64, user_id: i64) -> AppResult<i64> {
        let order_id = self.id_worker.next_id(&self.config.id_prefix).await?;
        let request = AdmissionRequest {
            voucher_id,
            user_id,
            order_id,
            now: Utc::now(),
        };

        match self.gate.admit(&self.config.stream, &request).await? {
            AdmissionResult::Admitted => {
                info!(
                    "Order {} admitted for user {} on voucher {}",
                    order_id, user_id, voucher_id
                );
                Ok(order_id)
            }
            AdmissionResult::Rejected(reason) => {
                debug!(
                    "User {} rejected on voucher {}: {}",
                    user_id, voucher_id, reason
                );
                Err(AppError::OrderRejected(reason))
            }
        }
    }

    /// Store a seckill voucher and seed its stock and window for admission
    #[instrument(skip(self, voucher), fields(voucher_id = voucher.voucher_id))]
    pub async fn publish_seckill_voucher(
        &self,
        voucher: &SeckillVoucher,
    ) -> AppResult<SeckillVoucher> {
        let created = self.voucher_repo.create_seckill(voucher).await?;
        self.gate.publish(&created).await?;

        info!(
            "Seckill voucher {} published with stock {}",
            created.voucher_id, created.stock
        );
        Ok(created)
    }

    /// Look up a published voucher
    pub async fn find_seckill_voucher(&self, voucher_id: i64) -> AppResult<SeckillVoucher> {
        self.voucher_repo
            .find_seckill(voucher_id)
            .await?
            .ok_or_else(|| AppError::VoucherNotFound(voucher_id.to_string()))
    }
}
