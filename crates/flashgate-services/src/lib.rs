//! Business logic services for Flashgate
//!
//! Services orchestrate the store and the repositories:
//!
//! - `ShopService` - shop reads through the cache-aside client, writes with invalidation
//! - `VoucherOrderService` - seckill admission and voucher publishing
//! - `OrderConsumer` - background persistence of admitted orders with pending-list recovery
//!
//! # Architecture
//!
//! - Services are generic over the store and repository traits from flashgate-core
//! - Dependencies are held in `Arc` and shared across async tasks
//! - Background work is started explicitly and stopped through a `CancellationToken`

pub mod order_consumer;
pub mod shop_service;
pub mod voucher_order_service;

pub use order_consumer::OrderConsumer;
pub use shop_service::ShopService;
pub use voucher_order_service::VoucherOrderService;
