//! API layer for Flashgate
//!
//! HTTP handlers for shop reads and writes, seckill voucher publishing and
//! seckill ordering. Handlers are generic over the store and repository
//! types so the same routes serve production and in-memory wiring.

#![forbid(unsafe_code)]

pub mod dto;
pub mod extractors;
pub mod handlers;

pub use dto::ApiResponse;
pub use extractors::CurrentUser;
pub use handlers::configure;
