//! Voucher order repository implementation
//!
//! The authoritative order write lives in [`create_voucher_order`], which runs
//! inside a transaction the caller opened. The repository method wraps it in
//! its own transaction and commits only when the order was created.

use async_trait::async_trait;
use flashgate_core::{
    models::{PersistOutcome, VoucherOrder},
    traits::VoucherOrderRepository,
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, instrument, warn};

/// Persist an admitted order inside `tx`
///
/// In order: refuse if the user already holds an order for the voucher,
/// decrement stock only while it is positive, insert the row. Nothing is
/// written unless the outcome is `Created`; roll back otherwise.
#[instrument(skip(tx, order), fields(order_id = order.id, user_id = order.user_id, voucher_id = order.voucher_id))]
pub async fn create_voucher_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &VoucherOrder,
) -> AppResult<PersistOutcome> {
    let (existing,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM tb_voucher_order WHERE user_id = $1 AND voucher_id = $2",
    )
    .bind(order.user_id)
    .bind(order.voucher_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error counting orders: {}", e);
        AppError::Database(format!("Failed to count orders: {}", e))
    })?;

    if existing > 0 {
        return Ok(PersistOutcome::AlreadyExists);
    }

    let decremented = sqlx::query(
        r#"
        UPDATE tb_seckill_voucher
        SET stock = stock - 1,
            update_time = NOW()
        WHERE voucher_id = $1 AND stock > 0
        "#,
    )
    .bind(order.voucher_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error decrementing stock: {}", e);
        AppError::Database(format!("Failed to decrement stock: {}", e))
    })?
    .rows_affected();

    if decremented == 0 {
        return Ok(PersistOutcome::OutOfStock);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO tb_voucher_order (id, user_id, voucher_id, status, create_time)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, voucher_id) DO NOTHING
        "#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.voucher_id)
    .bind(order.status.code())
    .bind(order.create_time)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error inserting order: {}", e);
        AppError::Database(format!("Failed to insert order: {}", e))
    })?
    .rows_affected();

    // A concurrent writer got past the count check first
    if inserted == 0 {
        return Ok(PersistOutcome::AlreadyExists);
    }

    debug!("Order {} persisted", order.id);
    Ok(PersistOutcome::Created)
}

/// PostgreSQL implementation of VoucherOrderRepository
pub struct PgVoucherOrderRepository {
    pool: PgPool,
}

impl PgVoucherOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoucherOrderRepository for PgVoucherOrderRepository {
    async fn create_voucher_order(&self, order: &VoucherOrder) -> AppResult<PersistOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let outcome = create_voucher_order(&mut tx, order).await?;

        if outcome == PersistOutcome::Created {
            tx.commit().await.map_err(|e| {
                error!("Failed to commit transaction: {}", e);
                AppError::Transaction(format!("Failed to commit transaction: {}", e))
            })?;
        } else {
            warn!("Order {} not persisted: {:?}", order.id, outcome);
            tx.rollback().await.map_err(|e| {
                error!("Failed to roll back transaction: {}", e);
                AppError::Transaction(format!("Failed to roll back transaction: {}", e))
            })?;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool, run_migrations};
    use chrono::Utc;
    use flashgate_core::models::SeckillVoucher;
    use flashgate_core::traits::VoucherRepository;

    async fn setup() -> PgPool {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/flashgate".to_string());
        let pool = create_pool(&database_url, Some(5)).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_second_order_for_same_user_is_refused() {
        let pool = setup().await;
        let voucher_id = Utc::now().timestamp_micros();
        let now = Utc::now();

        crate::repositories::PgVoucherRepository::new(pool.clone())
            .create_seckill(&SeckillVoucher::new(
                voucher_id,
                5,
                now,
                now + chrono::Duration::hours(1),
            ))
            .await
            .unwrap();

        let repo = PgVoucherOrderRepository::new(pool);
        let first = VoucherOrder::new(voucher_id, 1, voucher_id, now);
        let again = VoucherOrder::new(voucher_id + 1, 1, voucher_id, now);

        assert_eq!(
            repo.create_voucher_order(&first).await.unwrap(),
            PersistOutcome::Created
        );
        assert_eq!(
            repo.create_voucher_order(&again).await.unwrap(),
            PersistOutcome::AlreadyExists
        );
    }
}
