//! Background order persistence
//!
//! Admitted orders arrive on the order stream. One consumer loop reads them
//! through a consumer group, writes each under a per-user lock and
//! acknowledges only after the write. Anything that fails stays on the
//! group's pending list and is replayed until it goes through.

use flashgate_cache::keys::{self, ORDER_ENTITY};
use flashgate_cache::DistributedLock;
use flashgate_core::{
    config::SeckillConfig,
    models::{ConsumerId, PersistOutcome, QueueEntry, ReadOffset, VoucherOrder},
    traits::{CacheService, OrderStream, VoucherOrderRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct OrderConsumer<Q, C, R>
where
    Q: OrderStream,
    C: CacheService,
    R: VoucherOrderRepository,
{
    stream: Arc<Q>,
    lock: DistributedLock<C>,
    order_repo: Arc<R>,
    config: SeckillConfig,
    consumer: ConsumerId,
}

impl<Q, C, R> OrderConsumer<Q, C, R>
where
    Q: OrderStream + 'static,
    C: CacheService + 'static,
    R: VoucherOrderRepository + 'static,
{
    pub fn new(
        stream: Arc<Q>,
        lock: DistributedLock<C>,
        order_repo: Arc<R>,
        config: SeckillConfig,
    ) -> Self {
        let consumer = ConsumerId::new(config.group.clone(), config.consumer.clone());
        Self {
            stream,
            lock,
            order_repo,
            config,
            consumer,
        }
    }

    /// Run the loop on its own task until `shutdown` fires
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Consume the order stream until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        if !self.ensure_group(&shutdown).await {
            return;
        }

        info!(
            "Order consumer {}/{} reading {}",
            self.consumer.group, self.consumer.consumer, self.config.stream
        );

        // Entries delivered before a restart are still ours to finish
        self.handle_pending_list(&shutdown).await;

        loop {
            let read = tokio::select! {
                _ = shutdown.cancelled() => break,
                read = self.stream.read_group(
                    &self.config.stream,
                    &self.consumer,
                    ReadOffset::LastConsumed,
                    1,
                    Some(self.config.block()),
                ) => read,
            };

            let result = match read {
                Ok(entries) => self.process_entries(entries).await,
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                error!("Order handling failed, replaying pending list: {}", e);
                self.handle_pending_list(&shutdown).await;
            }
        }

        info!("Order consumer {} stopped", self.consumer.consumer);
    }

    /// Create the consumer group, retrying until it exists or shutdown fires
    async fn ensure_group(&self, shutdown: &CancellationToken) -> bool {
        loop {
            match self
                .stream
                .create_group(&self.config.stream, &self.consumer.group)
                .await
            {
                Ok(()) => return true,
                Err(e) => {
                    error!(
                        "Failed to create consumer group {} on {}: {}",
                        self.consumer.group, self.config.stream, e
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return false,
                        _ = tokio::time::sleep(self.config.pending_backoff()) => {}
                    }
                }
            }
        }
    }

    /// Replay this consumer's unacknowledged entries until none are left
    async fn handle_pending_list(&self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            let entries = match self
                .stream
                .read_group(
                    &self.config.stream,
                    &self.consumer,
                    ReadOffset::pending(),
                    1,
                    None,
                )
                .await
            {
                Ok(entries) => entries,
                Err(AppError::QueueGroupMissing(group)) => {
                    warn!("Consumer group {} vanished, creating it again", group);
                    if !self.ensure_group(shutdown).await {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Failed to read pending list: {}", e);
                    self.backoff(shutdown).await;
                    continue;
                }
            };

            if entries.is_empty() {
                debug!("Pending list of {} is empty", self.consumer.consumer);
                return;
            }

            if let Err(e) = self.process_entries(entries).await {
                error!("Pending order handling failed: {}", e);
                self.backoff(shutdown).await;
            }
        }
    }

    async fn backoff(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.pending_backoff()) => {}
        }
    }

    async fn process_entries(&self, entries: Vec<QueueEntry>) -> AppResult<()> {
        for entry in entries {
            self.process_entry(&entry).await?;
        }
        Ok(())
    }

    /// Persist one entry and acknowledge it
    ///
    /// Entries that cannot be decoded are acknowledged without a write.
    async fn process_entry(&self, entry: &QueueEntry) -> AppResult<()> {
        match entry.order() {
            Ok(order) => {
                self.handle_voucher_order(&order).await?;
            }
            Err(e) => {
                error!("Dropping undecodable entry {}: {}", entry.entry_id, e);
            }
        }

        self.stream
            .acknowledge(&self.config.stream, &self.consumer.group, &entry.entry_id)
            .await
    }

    /// Write one order under the lock of its user
    ///
    /// # Errors
    ///
    /// `AppError::LockNotAcquired` when another worker holds the user's lock;
    /// database failures as is.
    #[instrument(skip(self, order), fields(order_id = order.id, user_id = order.user_id))]
    pub async fn handle_voucher_order(&self, order: &VoucherOrder) -> AppResult<PersistOutcome> {
        let lock_key = keys::lock_key(ORDER_ENTITY, order.user_id);
        let handle = self
            .lock
            .try_lock_with_watchdog(&lock_key, self.config.order_lock_lease())
            .await?
            .ok_or_else(|| AppError::LockNotAcquired(lock_key.clone()))?;

        let written = self.order_repo.create_voucher_order(order).await;

        if let Err(e) = self.lock.unlock(handle).await {
            warn!("Failed to release {}: {}", lock_key, e);
        }

        let outcome = written?;
        match outcome {
            PersistOutcome::Created => {
                info!("Order {} persisted", order.id);
            }
            PersistOutcome::AlreadyExists => {
                warn!(
                    "User {} already holds an order for voucher {}, skipping {}",
                    order.user_id, order.voucher_id, order.id
                );
            }
            PersistOutcome::OutOfStock => {
                warn!(
                    "Voucher {} has no stock left in the database, skipping {}",
                    order.voucher_id, order.id
                );
            }
        }
        Ok(outcome)
    }
}
