//! Seckill voucher handlers

use crate::dto::{ApiResponse, SeckillVoucherRequest};
use actix_web::{web, HttpResponse};
use flashgate_core::models::SeckillVoucher;
use flashgate_core::traits::{CacheService, SeckillGate, VoucherRepository};
use flashgate_core::AppError;
use flashgate_services::VoucherOrderService;
use tracing::{instrument, warn};
use validator::Validate;

/// Publish a seckill voucher and seed its stock
///
/// POST /api/v1/vouchers/seckill
#[instrument(skip(service, req), fields(voucher_id = req.voucher_id))]
pub async fn publish_seckill_voucher<G, C, V>(
    service: web::Data<VoucherOrderService<G, C, V>>,
    req: web::Json<SeckillVoucherRequest>,
) -> Result<HttpResponse, AppError>
where
    G: SeckillGate + 'static,
    C: CacheService + 'static,
    V: VoucherRepository + 'static,
{
    req.validate().map_err(|e| {
        warn!("Seckill voucher validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let voucher = SeckillVoucher::from(req.into_inner());
    let created = service.publish_seckill_voucher(&voucher).await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        created,
        "Seckill voucher published",
    )))
}

/// GET /api/v1/vouchers/seckill/{id}
#[instrument(skip(service))]
pub async fn get_seckill_voucher<G, C, V>(
    service: web::Data<VoucherOrderService<G, C, V>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError>
where
    G: SeckillGate + 'static,
    C: CacheService + 'static,
    V: VoucherRepository + 'static,
{
    let voucher = service.find_seckill_voucher(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(voucher)))
}

pub fn configure<G, C, V>(cfg: &mut web::ServiceConfig)
where
    G: SeckillGate + 'static,
    C: CacheService + 'static,
    V: VoucherRepository + 'static,
{
    cfg.service(
        web::scope("/vouchers/seckill")
            .route("", web::post().to(publish_seckill_voucher::<G, C, V>))
            .route("/{id}", web::get().to(get_seckill_voucher::<G, C, V>)),
    );
}
