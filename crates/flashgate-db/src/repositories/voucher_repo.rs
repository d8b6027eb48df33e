//! Seckill voucher repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashgate_core::{
    models::SeckillVoucher, traits::VoucherRepository, AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of VoucherRepository
pub struct PgVoucherRepository {
    pool: PgPool,
}

impl PgVoucherRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoucherRepository for PgVoucherRepository {
    #[instrument(skip(self, voucher), fields(voucher_id = voucher.voucher_id))]
    async fn create_seckill(&self, voucher: &SeckillVoucher) -> AppResult<SeckillVoucher> {
        debug!(
            "Creating seckill voucher {} with stock {}",
            voucher.voucher_id, voucher.stock
        );

        let row = sqlx::query_as::<sqlx::Postgres, SeckillVoucherRow>(
            r#"
            INSERT INTO tb_seckill_voucher (voucher_id, stock, begin_time, end_time)
            VALUES ($1, $2, $3, $4)
            RETURNING voucher_id, stock, begin_time, end_time, create_time, update_time
            "#,
        )
        .bind(voucher.voucher_id)
        .bind(voucher.stock)
        .bind(voucher.begin_time)
        .bind(voucher.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error creating seckill voucher {}: {}",
                voucher.voucher_id, e
            );
            AppError::Database(format!("Failed to create seckill voucher: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_seckill(&self, voucher_id: i64) -> AppResult<Option<SeckillVoucher>> {
        let result = sqlx::query_as::<sqlx::Postgres, SeckillVoucherRow>(
            r#"
            SELECT voucher_id, stock, begin_time, end_time, create_time, update_time
            FROM tb_seckill_voucher
            WHERE voucher_id = $1
            "#,
        )
        .bind(voucher_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding seckill voucher {}: {}", voucher_id, e);
            AppError::Database(format!("Failed to find seckill voucher: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SeckillVoucherRow {
    voucher_id: i64,
    stock: i32,
    begin_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl From<SeckillVoucherRow> for SeckillVoucher {
    fn from(row: SeckillVoucherRow) -> Self {
        Self {
            voucher_id: row.voucher_id,
            stock: row.stock,
            begin_time: row.begin_time,
            end_time: row.end_time,
            create_time: row.create_time,
            update_time: row.update_time,
        }
    }
}
