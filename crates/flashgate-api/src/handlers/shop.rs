//! Shop handlers

use crate::dto::{ApiResponse, ShopUpdateRequest};
use actix_web::{web, HttpResponse};
use flashgate_core::models::Shop;
use flashgate_core::traits::{CacheService, ShopRepository};
use flashgate_core::AppError;
use flashgate_services::ShopService;
use tracing::{debug, instrument, warn};
use validator::Validate;

/// Get a shop through the cache
///
/// GET /api/v1/shops/{id}
#[instrument(skip(service))]
pub async fn get_shop<S, C>(
    service: web::Data<ShopService<S, C>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError>
where
    S: ShopRepository + 'static,
    C: CacheService + 'static,
{
    let id = path.into_inner();
    debug!(shop_id = id, "Fetching shop");

    let shop = service.query_by_id(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(shop)))
}

/// Update a shop and drop its cache entry
///
/// PUT /api/v1/shops
#[instrument(skip(service, req), fields(shop_id = req.id))]
pub async fn update_shop<S, C>(
    service: web::Data<ShopService<S, C>>,
    req: web::Json<ShopUpdateRequest>,
) -> Result<HttpResponse, AppError>
where
    S: ShopRepository + 'static,
    C: CacheService + 'static,
{
    req.validate().map_err(|e| {
        warn!("Shop update validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let shop = Shop::from(req.into_inner());
    service.update(&shop).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(shop.id, "Shop updated")))
}

pub fn configure<S, C>(cfg: &mut web::ServiceConfig)
where
    S: ShopRepository + 'static,
    C: CacheService + 'static,
{
    cfg.service(
        web::scope("/shops")
            .route("", web::put().to(update_shop::<S, C>))
            .route("/{id}", web::get().to(get_shop::<S, C>)),
    );
}
