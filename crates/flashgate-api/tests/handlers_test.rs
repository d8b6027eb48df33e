//! HTTP handlers wired to the in-memory store and database

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};
    use flashgate_api::configure;
    use flashgate_cache::{CacheClient, CacheOptions, IdWorker, MemoryStore, RebuildPool};
    use flashgate_core::config::{CacheConfig, SeckillConfig};
    use flashgate_core::models::Shop;
    use flashgate_core::traits::CacheService;
    use flashgate_db::MemoryDatabase;
    use flashgate_services::{ShopService, VoucherOrderService};
    use serde_json::{json, Value};
    use std::sync::Arc;

    type Shops = ShopService<MemoryDatabase, MemoryStore>;
    type Orders = VoucherOrderService<MemoryStore, MemoryStore, MemoryDatabase>;

    fn services(store: &Arc<MemoryStore>, db: &Arc<MemoryDatabase>) -> (Shops, Orders) {
        let config = CacheConfig::default();
        let cache = CacheClient::new(
            Arc::clone(store),
            RebuildPool::new(1, 8),
            CacheOptions::from(&config),
        );
        let shops = ShopService::new(Arc::clone(db), cache, config);
        let orders = VoucherOrderService::new(
            Arc::clone(store),
            IdWorker::new(Arc::clone(store)),
            Arc::clone(db),
            SeckillConfig::default(),
        );
        (shops, orders)
    }

    macro_rules! app {
        ($store:expr, $db:expr) => {{
            let (shops, orders) = services($store, $db);
            test::init_service(
                App::new()
                    .app_data(web::Data::new(shops))
                    .app_data(web::Data::new(orders))
                    .configure(configure::<MemoryDatabase, MemoryDatabase, MemoryStore, MemoryStore>),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn test_health() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        let app = app!(&store, &db);

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
    }

    #[actix_web::test]
    async fn test_get_and_update_shop() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        db.insert_shop(Shop::new(1, "Tea House", 1, "1 Main St"));
        let app = app!(&store, &db);

        let req = test::TestRequest::get().uri("/api/v1/shops/1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["name"], "Tea House");
        assert!(store.get("cache:shop:1").await.unwrap().is_some());

        let req = test::TestRequest::put()
            .uri("/api/v1/shops")
            .set_json(json!({
                "id": 1,
                "name": "Tea House II",
                "typeId": 1,
                "address": "1 Main St",
                "x": 0.0,
                "y": 0.0
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(store.get("cache:shop:1").await.unwrap(), None);

        let req = test::TestRequest::get().uri("/api/v1/shops/1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["name"], "Tea House II");
    }

    #[actix_web::test]
    async fn test_missing_shop_is_404() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        let app = app!(&store, &db);

        let req = test::TestRequest::get().uri("/api/v1/shops/404").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "shop_not_found");
    }

    #[actix_web::test]
    async fn test_seckill_flow() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        let app = app!(&store, &db);

        let req = test::TestRequest::post()
            .uri("/api/v1/vouchers/seckill")
            .set_json(json!({
                "voucherId": 9,
                "stock": 1,
                "beginTime": "2000-01-01T00:00:00Z",
                "endTime": "2999-01-01T00:00:00Z"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(store.stock(9), Some(1));

        let req = test::TestRequest::post()
            .uri("/api/v1/voucher-orders/seckill/9")
            .insert_header(("X-User-Id", "7"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["data"]["orderId"].as_i64().unwrap() > 0);

        let req = test::TestRequest::post()
            .uri("/api/v1/voucher-orders/seckill/9")
            .insert_header(("X-User-Id", "7"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "duplicate");

        let req = test::TestRequest::post()
            .uri("/api/v1/voucher-orders/seckill/9")
            .insert_header(("X-User-Id", "8"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "no_stock");
    }

    #[actix_web::test]
    async fn test_seckill_requires_user() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        let app = app!(&store, &db);

        let req = test::TestRequest::post()
            .uri("/api/v1/voucher-orders/seckill/9")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_invalid_voucher_window_is_400() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        let app = app!(&store, &db);

        let req = test::TestRequest::post()
            .uri("/api/v1/vouchers/seckill")
            .set_json(json!({
                "voucherId": 9,
                "stock": 1,
                "beginTime": "2024-01-02T00:00:00Z",
                "endTime": "2024-01-01T00:00:00Z"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");

        let req = test::TestRequest::post()
            .uri("/api/v1/vouchers/seckill")
            .set_json(json!({
                "voucherId": 9,
                "stock": -1,
                "beginTime": "2024-01-01T00:00:00Z",
                "endTime": "2024-01-02T00:00:00Z"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.stock(9), None);
    }

    #[actix_web::test]
    async fn test_invalid_shop_update_is_400() {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(MemoryDatabase::new());
        db.insert_shop(Shop::new(1, "Tea House", 1, "1 Main St"));
        let app = app!(&store, &db);

        for body in [
            json!({ "id": 0, "name": "Tea House", "typeId": 1, "address": "", "x": 0.0, "y": 0.0 }),
            json!({ "id": 1, "name": "", "typeId": 1, "address": "", "x": 0.0, "y": 0.0 }),
        ] {
            let req = test::TestRequest::put()
                .uri("/api/v1/shops")
                .set_json(&body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let req = test::TestRequest::get().uri("/api/v1/shops/1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["name"], "Tea House");
    }
}
