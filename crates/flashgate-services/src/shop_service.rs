//! Shop reads and writes
//!
//! Reads go through the cache-aside client with the configured strategy.
//! Writes update the database first and then drop (or, under logical expiry,
//! rewrite) the cache entry.

use chrono::Utc;
use flashgate_cache::keys::{self, SHOP_ENTITY};
use flashgate_cache::{CacheClient, CacheTtl};
use flashgate_core::{
    config::{CacheConfig, CacheStrategy},
    models::Shop,
    traits::{CacheService, ShopRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct ShopService<S: ShopRepository, C: CacheService> {
    shop_repo: Arc<S>,
    cache: CacheClient<C>,
    config: CacheConfig,
}

impl<S, C> ShopService<S, C>
where
    S: ShopRepository + 'static,
    C: CacheService + 'static,
{
    pub fn new(shop_repo: Arc<S>, cache: CacheClient<C>, config: CacheConfig) -> Self {
        Self {
            shop_repo,
            cache,
            config,
        }
    }

    fn ttl(&self) -> CacheTtl {
        CacheTtl::minutes(self.config.shop_ttl_minutes)
    }

    fn logical_expiry(&self) -> Duration {
        Duration::from_secs(self.config.logical_expire_secs)
    }

    /// Find a shop with the configured strategy
    ///
    /// # Errors
    ///
    /// `AppError::ShopNotFound` when the shop does not exist (or, under logical
    /// expiry, has not been warmed up).
    #[instrument(skip(self))]
    pub async fn query_by_id(&self, id: i64) -> AppResult<Shop> {
        self.query_with(id, self.config.shop_strategy)
            .await?
            .ok_or_else(|| AppError::ShopNotFound(id.to_string()))
    }

    /// Find a shop with an explicit strategy
    pub async fn query_with(&self, id: i64, strategy: CacheStrategy) -> AppResult<Option<Shop>> {
        let repo = Arc::clone(&self.shop_repo);
        let loader = move |id: i64| async move { repo.find_by_id(id).await };

        match strategy {
            CacheStrategy::PassThrough => {
                self.cache
                    .query_with_pass_through(SHOP_ENTITY, id, loader, self.ttl())
                    .await
            }
            CacheStrategy::Mutex => {
                self.cache
                    .query_with_mutex(SHOP_ENTITY, id, loader, self.ttl())
                    .await
            }
            CacheStrategy::LogicalExpire => {
                self.cache
                    .query_with_logical_expire(SHOP_ENTITY, id, loader, self.logical_expiry())
                    .await
            }
        }
    }

    /// Write the shop, then keep the cache from serving the old version
    #[instrument(skip(self, shop), fields(shop_id = shop.id))]
    pub async fn update(&self, shop: &Shop) -> AppResult<()> {
        let mut shop = shop.clone();
        shop.update_time = Utc::now();
        if !self.shop_repo.update(&shop).await? {
            return Err(AppError::ShopNotFound(shop.id.to_string()));
        }

        if self.config.shop_strategy == CacheStrategy::LogicalExpire {
            // Logical-expire keys are never loaded on a miss, so rewrite instead of delete
            self.warm_up(shop.id).await?;
        } else {
            self.cache.invalidate(SHOP_ENTITY, shop.id).await?;
        }

        info!("Shop {} updated", shop.id);
        Ok(())
    }

    /// Seed the logical-expire entry of a shop from the database
    ///
    /// Returns `false` when the shop does not exist.
    #[instrument(skip(self))]
    pub async fn warm_up(&self, id: i64) -> AppResult<bool> {
        let Some(shop) = self.shop_repo.find_by_id(id).await? else {
            debug!("Shop {} not found, nothing to warm", id);
            return Ok(false);
        };

        self.cache
            .set_with_logical_expire(
                &keys::cache_key(SHOP_ENTITY, id),
                &shop,
                self.logical_expiry(),
            )
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashgate_cache::{CacheOptions, MemoryStore, RebuildPool};
    use flashgate_db::MemoryDatabase;

    fn service(
        strategy: CacheStrategy,
    ) -> (
        ShopService<MemoryDatabase, MemoryStore>,
        Arc<MemoryDatabase>,
        Arc<MemoryStore>,
    ) {
        let db = Arc::new(MemoryDatabase::new());
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            shop_strategy: strategy,
            ..CacheConfig::default()
        };
        let cache = CacheClient::new(
            Arc::clone(&store),
            RebuildPool::new(2, 16),
            CacheOptions::from(&config),
        );
        (
            ShopService::new(Arc::clone(&db), cache, config),
            db,
            store,
        )
    }

    #[tokio::test]
    async fn test_query_caches_shop() {
        let (service, db, store) = service(CacheStrategy::Mutex);
        db.insert_shop(Shop::new(1, "Tea House", 1, "1 Main St"));

        assert_eq!(service.query_by_id(1).await.unwrap().name, "Tea House");
        assert!(store.get("cache:shop:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_shop_is_not_found_and_cached_as_absent() {
        let (service, _db, store) = service(CacheStrategy::PassThrough);

        assert!(matches!(
            service.query_by_id(99).await,
            Err(AppError::ShopNotFound(_))
        ));
        assert_eq!(
            store.get("cache:shop:99").await.unwrap(),
            Some(String::new())
        );
    }

    #[tokio::test]
    async fn test_update_invalidates_cache() {
        let (service, db, store) = service(CacheStrategy::Mutex);
        let shop = Shop::new(1, "Tea House", 1, "1 Main St");
        db.insert_shop(shop.clone());
        service.query_by_id(1).await.unwrap();

        let renamed = Shop {
            name: "Tea House II".to_string(),
            ..shop
        };
        service.update(&renamed).await.unwrap();

        assert_eq!(store.get("cache:shop:1").await.unwrap(), None);
        assert_eq!(service.query_by_id(1).await.unwrap().name, "Tea House II");
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_shop() {
        let (service, _db, _store) = service(CacheStrategy::Mutex);

        assert!(matches!(
            service.update(&Shop::new(5, "x", 1, "")).await,
            Err(AppError::ShopNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_logical_expire_needs_warm_up() {
        let (service, db, _store) = service(CacheStrategy::LogicalExpire);
        db.insert_shop(Shop::new(1, "Tea House", 1, "1 Main St"));

        assert!(matches!(
            service.query_by_id(1).await,
            Err(AppError::ShopNotFound(_))
        ));

        assert!(service.warm_up(1).await.unwrap());
        assert!(!service.warm_up(2).await.unwrap());
        assert_eq!(service.query_by_id(1).await.unwrap().name, "Tea House");
    }
}
