//! In-memory database
//!
//! Implements the shop, voucher and order repositories over maps behind a
//! single mutex, so `create_voucher_order` is as atomic as the SQL
//! transaction it stands in for.

use async_trait::async_trait;
use chrono::Utc;
use flashgate_core::models::{PersistOutcome, SeckillVoucher, Shop, VoucherOrder};
use flashgate_core::traits::{ShopRepository, VoucherOrderRepository, VoucherRepository};
use flashgate_core::{AppError, AppResult};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Tables {
    shops: HashMap<i64, Shop>,
    vouchers: HashMap<i64, SeckillVoucher>,
    orders: HashMap<i64, VoucherOrder>,
    /// Order writes still to fail, for exercising recovery
    failing_writes: usize,
}

#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_shop(&self, shop: Shop) {
        self.tables.lock().shops.insert(shop.id, shop);
    }

    /// Make the next `count` order writes fail before touching any table
    pub fn fail_next_order_writes(&self, count: usize) {
        self.tables.lock().failing_writes = count;
    }

    pub fn order_count(&self) -> usize {
        self.tables.lock().orders.len()
    }

    pub fn orders_of_voucher(&self, voucher_id: i64) -> Vec<VoucherOrder> {
        let mut orders: Vec<_> = self
            .tables
            .lock()
            .orders
            .values()
            .filter(|order| order.voucher_id == voucher_id)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        orders
    }

    pub fn stock_of(&self, voucher_id: i64) -> Option<i32> {
        self.tables
            .lock()
            .vouchers
            .get(&voucher_id)
            .map(|voucher| voucher.stock)
    }
}

#[async_trait]
impl ShopRepository for MemoryDatabase {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Shop>> {
        Ok(self.tables.lock().shops.get(&id).cloned())
    }

    async fn update(&self, shop: &Shop) -> AppResult<bool> {
        let mut tables = self.tables.lock();
        match tables.shops.get_mut(&shop.id) {
            Some(existing) => {
                *existing = Shop {
                    create_time: existing.create_time,
                    update_time: Utc::now(),
                    ..shop.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl VoucherRepository for MemoryDatabase {
    async fn create_seckill(&self, voucher: &SeckillVoucher) -> AppResult<SeckillVoucher> {
        let mut tables = self.tables.lock();
        if tables.vouchers.contains_key(&voucher.voucher_id) {
            return Err(AppError::Database(format!(
                "duplicate key value violates unique constraint: voucher_id={}",
                voucher.voucher_id
            )));
        }
        tables.vouchers.insert(voucher.voucher_id, voucher.clone());
        Ok(voucher.clone())
    }

    async fn find_seckill(&self, voucher_id: i64) -> AppResult<Option<SeckillVoucher>> {
        Ok(self.tables.lock().vouchers.get(&voucher_id).cloned())
    }
}

#[async_trait]
impl VoucherOrderRepository for MemoryDatabase {
    async fn create_voucher_order(&self, order: &VoucherOrder) -> AppResult<PersistOutcome> {
        let mut tables = self.tables.lock();

        if tables.failing_writes > 0 {
            tables.failing_writes -= 1;
            return Err(AppError::Database("injected write failure".to_string()));
        }

        let exists = tables
            .orders
            .values()
            .any(|o| o.user_id == order.user_id && o.voucher_id == order.voucher_id);
        if exists {
            return Ok(PersistOutcome::AlreadyExists);
        }

        match tables.vouchers.get_mut(&order.voucher_id) {
            Some(voucher) if voucher.stock > 0 => voucher.stock -= 1,
            _ => return Ok(PersistOutcome::OutOfStock),
        }

        tables.orders.insert(order.id, order.clone());
        Ok(PersistOutcome::Created)
    }
}
