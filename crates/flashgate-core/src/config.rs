//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub seckill: SeckillConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    20
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

/// Which stampede strategy the shop read path uses
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Cache absent results as an empty sentinel
    PassThrough,
    /// Serialize rebuilds of a missing key behind a mutex
    #[default]
    Mutex,
    /// Serve stale entries while a background task rebuilds them
    LogicalExpire,
}

/// Cache-aside client configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// TTL of the "known absent" sentinel, in minutes
    #[serde(default = "default_null_ttl_minutes")]
    pub null_ttl_minutes: u64,

    /// Nominal TTL of cached shops, in minutes (jitter is added on write)
    #[serde(default = "default_shop_ttl_minutes")]
    pub shop_ttl_minutes: u64,

    /// Logical expiry window for shops under the logical-expire strategy, in seconds
    #[serde(default = "default_logical_expire_secs")]
    pub logical_expire_secs: u64,

    /// Expiry of the rebuild mutex, in seconds
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Sleep between attempts when the rebuild mutex is contended, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on lookup attempts under the mutex strategy
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Number of background rebuild workers
    #[serde(default = "default_rebuild_workers")]
    pub rebuild_workers: usize,

    /// Capacity of the rebuild submission queue
    #[serde(default = "default_rebuild_queue")]
    pub rebuild_queue_capacity: usize,

    /// Strategy used by the shop read path
    #[serde(default)]
    pub shop_strategy: CacheStrategy,
}

fn default_null_ttl_minutes() -> u64 {
    2
}

fn default_shop_ttl_minutes() -> u64 {
    30
}

fn default_logical_expire_secs() -> u64 {
    20
}

fn default_lock_ttl_secs() -> u64 {
    10
}

fn default_retry_delay_ms() -> u64 {
    50
}

fn default_max_attempts() -> u32 {
    200
}

fn default_rebuild_workers() -> usize {
    10
}

fn default_rebuild_queue() -> usize {
    1024
}

impl CacheConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            null_ttl_minutes: default_null_ttl_minutes(),
            shop_ttl_minutes: default_shop_ttl_minutes(),
            logical_expire_secs: default_logical_expire_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            rebuild_workers: default_rebuild_workers(),
            rebuild_queue_capacity: default_rebuild_queue(),
            shop_strategy: CacheStrategy::default(),
        }
    }
}

/// Seckill pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SeckillConfig {
    /// Stream that carries admitted orders
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Consumer group name
    #[serde(default = "default_group")]
    pub group: String,

    /// Consumer name within the group
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// How long one queue read blocks when the stream is empty, in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// Backoff after a failed pending-list pass, in milliseconds
    #[serde(default = "default_pending_backoff_ms")]
    pub pending_backoff_ms: u64,

    /// Lease of the per-subject order lock, in seconds (renewed by a watchdog)
    #[serde(default = "default_order_lock_lease_secs")]
    pub order_lock_lease_secs: u64,

    /// Prefix handed to the ID generator for order ids
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
}

fn default_stream() -> String {
    "stream.orders".to_string()
}

fn default_group() -> String {
    "g1".to_string()
}

fn default_consumer() -> String {
    "c1".to_string()
}

fn default_block_ms() -> u64 {
    2000
}

fn default_pending_backoff_ms() -> u64 {
    20
}

fn default_order_lock_lease_secs() -> u64 {
    30
}

fn default_id_prefix() -> String {
    "order".to_string()
}

impl SeckillConfig {
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn pending_backoff(&self) -> Duration {
        Duration::from_millis(self.pending_backoff_ms)
    }

    pub fn order_lock_lease(&self) -> Duration {
        Duration::from_secs(self.order_lock_lease_secs)
    }
}

impl Default for SeckillConfig {
    fn default() -> Self {
        Self {
            stream: default_stream(),
            group: default_group(),
            consumer: default_consumer(),
            block_ms: default_block_ms(),
            pending_backoff_ms: default_pending_backoff_ms(),
            order_lock_lease_secs: default_order_lock_lease_secs(),
            id_prefix: default_id_prefix(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 20)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with FLASHGATE_ prefix
            .add_source(
                Environment::with_prefix("FLASHGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("FLASHGATE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
