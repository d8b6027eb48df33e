//! Flashgate Database Layer
//!
//! PostgreSQL access for the relational side of Flashgate:
//!
//! - Connection pool management and embedded migrations with sqlx
//! - Repositories for shops, seckill vouchers and voucher orders
//! - The transactional order write used by the order consumer
//! - An in-memory database implementing the same repository traits

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::MemoryDatabase;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use flashgate_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
