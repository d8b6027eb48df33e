//! Order stream on Redis Streams with consumer groups

use crate::RedisStore;
use async_trait::async_trait;
use flashgate_core::error::AppError;
use flashgate_core::models::{ConsumerId, QueueEntry, ReadOffset, VoucherOrder};
use flashgate_core::traits::OrderStream;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

fn into_entries(reply: StreamReadReply) -> Vec<QueueEntry> {
    let mut entries = Vec::new();
    for key in reply.keys {
        for id in key.ids {
            let mut fields = HashMap::with_capacity(id.map.len());
            for (field, value) in id.map.iter() {
                match redis::from_redis_value::<String>(value) {
                    Ok(text) => {
                        fields.insert(field.clone(), text);
                    }
                    Err(e) => warn!("Stream entry {} field {} unreadable: {}", id.id, field, e),
                }
            }
            entries.push(QueueEntry {
                entry_id: id.id,
                fields,
            });
        }
    }
    entries
}

#[async_trait]
impl OrderStream for RedisStore {
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), AppError> {
        let mut conn = self.connection();

        let result: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
        match result {
            Ok(()) => {
                info!("Created consumer group {} on {}", group, stream);
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Consumer group {} already exists on {}", group, stream);
                Ok(())
            }
            Err(e) => Err(AppError::Queue(format!(
                "Failed to create group {} on {}: {}",
                group, stream, e
            ))),
        }
    }

    async fn append(&self, stream: &str, order: &VoucherOrder) -> Result<String, AppError> {
        debug!("XADD {} order {}", stream, order.id);
        let mut conn = self.connection();

        let entry_id: String = conn
            .xadd(stream, "*", order.to_fields().as_slice())
            .await
            .map_err(|e| AppError::Queue(format!("XADD {} failed: {}", stream, e)))?;
        Ok(entry_id)
    }

    async fn read_group(
        &self,
        stream: &str,
        consumer: &ConsumerId,
        offset: ReadOffset,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        let mut conn = self.connection();

        let mut options = StreamReadOptions::default()
            .group(&consumer.group, &consumer.consumer)
            .count(count);
        if let Some(block) = block {
            options = options.block(block.as_millis() as usize);
        }

        // A timed-out blocking read replies nil
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[offset.as_stream_id()], &options)
            .await
            .map_err(|e| {
                if e.code() == Some("NOGROUP") {
                    AppError::QueueGroupMissing(format!("{} on {}", consumer.group, stream))
                } else {
                    AppError::Queue(format!(
                        "XREADGROUP {} {} {} failed: {}",
                        stream, consumer.group, consumer.consumer, e
                    ))
                }
            })?;

        Ok(reply.map(into_entries).unwrap_or_default())
    }

    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<(), AppError> {
        debug!("XACK {} {} {}", stream, group, entry_id);
        let mut conn = self.connection();

        let _: i64 = conn
            .xack(stream, group, &[entry_id])
            .await
            .map_err(|e| AppError::Queue(format!("XACK {} failed: {}", entry_id, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn setup_store() -> RedisStore {
        let store = RedisStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        store.flush_db().await.expect("Failed to flush DB");
        store
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_group_read_ack_cycle() {
        let store = setup_store().await;
        let consumer = ConsumerId::new("g1", "c1");

        store.create_group("stream.test", "g1").await.unwrap();
        // Creating twice is not an error
        store.create_group("stream.test", "g1").await.unwrap();

        let order = VoucherOrder::new(1, 2, 3, Utc::now());
        let entry_id = store.append("stream.test", &order).await.unwrap();

        let delivered = store
            .read_group("stream.test", &consumer, ReadOffset::LastConsumed, 1, None)
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entry_id, entry_id);
        assert_eq!(delivered[0].order().unwrap().id, 1);

        let pending = store
            .read_group("stream.test", &consumer, ReadOffset::pending(), 1, None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        store.acknowledge("stream.test", "g1", &entry_id).await.unwrap();
        let pending = store
            .read_group("stream.test", &consumer, ReadOffset::pending(), 1, None)
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_blocking_read_times_out_empty() {
        let store = setup_store().await;
        let consumer = ConsumerId::new("g1", "c1");
        store.create_group("stream.empty", "g1").await.unwrap();

        let entries = store
            .read_group(
                "stream.empty",
                &consumer,
                ReadOffset::LastConsumed,
                1,
                Some(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
