//! HTTP request handlers

pub mod health;
pub mod order;
pub mod shop;
pub mod voucher;

use actix_web::web;
use flashgate_core::traits::{CacheService, SeckillGate, ShopRepository, VoucherRepository};

/// Register every route under `/api/v1`
///
/// The app must carry `web::Data<ShopService<S, C>>` and
/// `web::Data<VoucherOrderService<G, C, V>>`.
pub fn configure<S, V, C, G>(cfg: &mut web::ServiceConfig)
where
    S: ShopRepository + 'static,
    V: VoucherRepository + 'static,
    C: CacheService + 'static,
    G: SeckillGate + 'static,
{
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .configure(shop::configure::<S, C>)
            .configure(voucher::configure::<G, C, V>)
            .configure(order::configure::<G, C, V>),
    );
}
