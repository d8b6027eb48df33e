//! Shop repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashgate_core::{models::Shop, traits::ShopRepository, AppError, AppResult};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of ShopRepository
pub struct PgShopRepository {
    pool: PgPool,
}

impl PgShopRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShopRepository for PgShopRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Shop>> {
        debug!("Finding shop by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ShopRow>(
            r#"
            SELECT
                id, name, type_id, images, area, address, x, y,
                avg_price, sold, comments, score, open_hours,
                create_time, update_time
            FROM tb_shop
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding shop {}: {}", id, e);
            AppError::Database(format!("Failed to find shop: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, shop), fields(shop_id = shop.id))]
    async fn update(&self, shop: &Shop) -> AppResult<bool> {
        debug!("Updating shop: {}", shop.id);

        let result = sqlx::query(
            r#"
            UPDATE tb_shop
            SET name = $2,
                type_id = $3,
                images = $4,
                area = $5,
                address = $6,
                x = $7,
                y = $8,
                avg_price = $9,
                sold = $10,
                comments = $11,
                score = $12,
                open_hours = $13,
                update_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(shop.id)
        .bind(&shop.name)
        .bind(shop.type_id)
        .bind(&shop.images)
        .bind(&shop.area)
        .bind(&shop.address)
        .bind(shop.x)
        .bind(shop.y)
        .bind(shop.avg_price)
        .bind(shop.sold)
        .bind(shop.comments)
        .bind(shop.score)
        .bind(&shop.open_hours)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating shop {}: {}", shop.id, e);
            AppError::Database(format!("Failed to update shop: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ShopRow {
    id: i64,
    name: String,
    type_id: i64,
    images: String,
    area: Option<String>,
    address: String,
    x: f64,
    y: f64,
    avg_price: Option<i64>,
    sold: i32,
    comments: i32,
    score: i32,
    open_hours: Option<String>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            type_id: row.type_id,
            images: row.images,
            area: row.area,
            address: row.address,
            x: row.x,
            y: row.y,
            avg_price: row.avg_price,
            sold: row.sold,
            comments: row.comments,
            score: row.score,
            open_hours: row.open_hours,
            create_time: row.create_time,
            update_time: row.update_time,
        }
    }
}
