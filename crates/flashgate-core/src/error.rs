//! Unified error handling for Flashgate
//!
//! This module provides a single error type covering every failure scenario
//! in the workspace, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Why the admission script refused a seckill request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Stock for the voucher is exhausted (or the voucher was never published)
    NoStock,
    /// The subject already holds an order for this voucher
    Duplicate,
    /// The sale window has not opened yet
    NotStarted,
    /// The sale window has closed
    Ended,
}

impl RejectReason {
    /// Stable machine-readable code
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoStock => "no_stock",
            RejectReason::Duplicate => "duplicate",
            RejectReason::NotStarted => "not_started",
            RejectReason::Ended => "ended",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoStock => write!(f, "voucher is out of stock"),
            RejectReason::Duplicate => write!(f, "an order for this voucher already exists"),
            RejectReason::NotStarted => write!(f, "the sale has not started"),
            RejectReason::Ended => write!(f, "the sale has ended"),
        }
    }
}

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache / Store Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Consumer group missing: {0}")]
    QueueGroupMissing(String),

    // ==================== Contention Errors ====================
    #[error("Lock not acquired: {0}")]
    LockNotAcquired(String),

    #[error("Cache rebuild still contended after {attempts} attempts: {key}")]
    CacheRebuildContended { key: String, attempts: u32 },

    #[error("Worker pool saturated: {0}")]
    PoolSaturated(String),

    // ==================== Business Logic Errors ====================
    #[error("Shop not found: {0}")]
    ShopNotFound(String),

    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    #[error("Order rejected: {0}")]
    OrderRejected(RejectReason),

    // ==================== Request Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::OrderRejected(RejectReason::NotStarted) => {
                StatusCode::BAD_REQUEST
            }

            // 401 Unauthorized
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            AppError::ShopNotFound(_) | AppError::VoucherNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::OrderRejected(_) => StatusCode::CONFLICT,

            // 503 Service Unavailable
            AppError::CacheRebuildContended { .. }
            | AppError::PoolSaturated(_)
            | AppError::LockNotAcquired(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::Queue(_) => "queue_error",
            AppError::QueueGroupMissing(_) => "queue_group_missing",
            AppError::LockNotAcquired(_) => "lock_not_acquired",
            AppError::CacheRebuildContended { .. } => "cache_rebuild_contended",
            AppError::PoolSaturated(_) => "pool_saturated",
            AppError::ShopNotFound(_) => "shop_not_found",
            AppError::VoucherNotFound(_) => "voucher_not_found",
            AppError::OrderRejected(reason) => reason.as_str(),
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => AppError::Pool(err.to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
