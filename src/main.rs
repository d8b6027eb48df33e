//! Flashgate server
//!
//! Shop reads behind a cache-aside layer and flash-sale ordering with
//! asynchronous persistence. Wires configuration, tracing, the database pool,
//! the Redis stores, the background order consumer and the HTTP server.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use flashgate_api::configure;
use flashgate_cache::{CacheClient, CacheOptions, DistributedLock, IdWorker, RebuildPool, RedisStore};
use flashgate_core::AppConfig;
use flashgate_db::{
    create_pool, run_migrations, PgShopRepository, PgVoucherOrderRepository, PgVoucherRepository,
};
use flashgate_services::{OrderConsumer, ShopService, VoucherOrderService};
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "flashgate={0},flashgate_api={0},flashgate_services={0},flashgate_cache={0},flashgate_db={0},actix_web=info,sqlx=warn",
            log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
        }))
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Flashgate v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections)).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    info!("Connecting to Redis...");
    let store = Arc::new(RedisStore::new(&config.redis.url).await?);
    store.ping().await?;
    // Blocking stream reads get a connection of their own
    let consumer_store = Arc::new(RedisStore::new(&config.redis.url).await?);

    let rebuild_pool = RebuildPool::new(
        config.cache.rebuild_workers,
        config.cache.rebuild_queue_capacity,
    );
    let cache = CacheClient::new(
        Arc::clone(&store),
        rebuild_pool.clone(),
        CacheOptions::from(&config.cache),
    );

    let shop_service = web::Data::new(ShopService::new(
        Arc::new(PgShopRepository::new(pool.clone())),
        cache,
        config.cache.clone(),
    ));
    let order_service = web::Data::new(VoucherOrderService::new(
        Arc::clone(&store),
        IdWorker::new(Arc::clone(&store)),
        Arc::new(PgVoucherRepository::new(pool.clone())),
        config.seckill.clone(),
    ));

    let shutdown = CancellationToken::new();
    let consumer = OrderConsumer::new(
        consumer_store,
        DistributedLock::new(Arc::clone(&store)),
        Arc::new(PgVoucherOrderRepository::new(pool.clone())),
        config.seckill.clone(),
    )
    .spawn(shutdown.clone());

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(shop_service.clone())
            .app_data(order_service.clone())
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(
                configure::<PgShopRepository, PgVoucherRepository, RedisStore, RedisStore>,
            )
    })
    .workers(config.server.workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped, draining background work");
    shutdown.cancel();
    if let Err(e) = consumer.await {
        warn!("Order consumer ended abnormally: {}", e);
    }
    rebuild_pool.shutdown().await;
    pool.close().await;

    info!("Flashgate stopped");
    Ok(())
}
