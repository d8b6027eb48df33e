//! Seckill order handler

use crate::dto::{ApiResponse, SeckillOrderResponse};
use crate::extractors::CurrentUser;
use actix_web::{web, HttpResponse};
use flashgate_core::traits::{CacheService, SeckillGate, VoucherRepository};
use flashgate_core::AppError;
use flashgate_services::VoucherOrderService;
use tracing::instrument;

/// Buy one unit of a seckill voucher
///
/// Answers as soon as the order is admitted; the row is written in the background.
///
/// POST /api/v1/voucher-orders/seckill/{voucher_id}
#[instrument(skip(service))]
pub async fn seckill_voucher<G, C, V>(
    service: web::Data<VoucherOrderService<G, C, V>>,
    path: web::Path<i64>,
    user: CurrentUser,
) -> Result<HttpResponse, AppError>
where
    G: SeckillGate + 'static,
    C: CacheService + 'static,
    V: VoucherRepository + 'static,
{
    let order_id = service
        .seckill_voucher(path.into_inner(), user.user_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SeckillOrderResponse { order_id })))
}

pub fn configure<G, C, V>(cfg: &mut web::ServiceConfig)
where
    G: SeckillGate + 'static,
    C: CacheService + 'static,
    V: VoucherRepository + 'static,
{
    cfg.route(
        "/voucher-orders/seckill/{voucher_id}",
        web::post().to(seckill_voucher::<G, C, V>),
    );
}
