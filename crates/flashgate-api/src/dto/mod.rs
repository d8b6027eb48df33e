//! Data transfer objects for the HTTP API

pub mod common;
pub mod shop;
pub mod voucher;

pub use common::ApiResponse;
pub use shop::ShopUpdateRequest;
pub use voucher::{SeckillOrderResponse, SeckillVoucherRequest};
