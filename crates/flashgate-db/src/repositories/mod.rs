//! Repository implementations
//!
//! Concrete implementations of the repository traits defined in
//! flashgate-core, using sqlx for PostgreSQL access.

pub mod shop_repo;
pub mod voucher_order_repo;
pub mod voucher_repo;

pub use shop_repo::PgShopRepository;
pub use voucher_order_repo::{create_voucher_order, PgVoucherOrderRepository};
pub use voucher_repo::PgVoucherRepository;
