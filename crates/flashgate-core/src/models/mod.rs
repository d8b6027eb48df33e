//! Domain models for Flashgate
//!
//! This module contains the core domain models used throughout the application.

pub mod order;
pub mod shop;
pub mod voucher;

pub use order::{
    AdmissionResult, ConsumerId, OrderStatus, PersistOutcome, QueueEntry, ReadOffset,
    VoucherOrder,
};
pub use shop::Shop;
pub use voucher::{SaleWindow, SeckillVoucher};
