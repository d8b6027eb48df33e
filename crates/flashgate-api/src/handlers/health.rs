//! Health check

use actix_web::HttpResponse;
use serde_json::json;

/// GET /api/v1/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "flashgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
