//! Redis Streams-backed work queue (durable, at-least-once delivery).
//!
//! - **Stream Key**: `tasks_queue` (one stream, one consumer group)
//! - **Consumer Group**: `workers`; every worker loop is a named consumer in it
//! - **Redelivery**: entries idle longer than the claim timeout are `XCLAIM`ed by
//!   the next consumer that asks for work (`XPENDING ... IDLE`, Redis 6.2+)
//! - **Dead-Letter Queue**: `tasks_queue:dlq` (poison messages and entries that
//!   exceeded the delivery limit)
//!
//! Each entry carries two fields: `payload` (the JSON descriptor) and
//! `content_type` (`application/json`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId, StreamReadReply,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use jobpipe_core::{DESCRIPTOR_CONTENT_TYPE, JobDescriptor, QUEUE_NAME};

use super::{DEFAULT_CLAIM_IDLE, DEFAULT_MAX_DELIVERIES, Delivery, JobQueue, QueueError};

/// Consumer group shared by every worker.
pub const CONSUMER_GROUP: &str = "workers";

/// How many idle pending entries to inspect per claim attempt.
const PENDING_SCAN: usize = 10;

#[derive(Clone)]
pub struct RedisStreamsJobQueue {
    client: Arc<redis::Client>,
    // Shared for XADD/XACK; never used for blocking reads.
    conn: MultiplexedConnection,
    // Blocking XREADGROUP stalls a connection, so each consumer gets its own.
    consumer_conns: Arc<Mutex<HashMap<String, MultiplexedConnection>>>,
    stream_key: String,
    dlq_key: String,
    group: String,
    max_deliveries: u32,
    claim_idle: Duration,
}

impl std::fmt::Debug for RedisStreamsJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsJobQueue")
            .field("stream_key", &self.stream_key)
            .field("dlq_key", &self.dlq_key)
            .field("group", &self.group)
            .field("max_deliveries", &self.max_deliveries)
            .field("claim_idle", &self.claim_idle)
            .finish()
    }
}

impl RedisStreamsJobQueue {
    /// Connect to Redis and make sure the stream and consumer group exist.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let queue = Self {
            client: Arc::new(client),
            conn,
            consumer_conns: Arc::new(Mutex::new(HashMap::new())),
            stream_key: QUEUE_NAME.to_string(),
            dlq_key: dlq_key_for(QUEUE_NAME),
            group: CONSUMER_GROUP.to_string(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            claim_idle: DEFAULT_CLAIM_IDLE,
        };
        queue.ensure_consumer_group().await?;
        Ok(queue)
    }

    pub fn with_redelivery(mut self, claim_idle: Duration, max_deliveries: u32) -> Self {
        self.claim_idle = claim_idle;
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// `XGROUP CREATE ... MKSTREAM`; an existing group is not an error.
    pub async fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(QueueError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }

    async fn consumer_connection(
        &self,
        consumer: &str,
    ) -> Result<MultiplexedConnection, QueueError> {
        let mut conns = self.consumer_conns.lock().await;
        if let Some(conn) = conns.get(consumer) {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        conns.insert(consumer.to_string(), conn.clone());
        Ok(conn)
    }

    /// Claim one idle pending entry for `consumer`, dead-lettering any that ran
    /// out of deliveries along the way.
    async fn claim_idle_entry(&self, consumer: &str) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let min_idle_ms = self.claim_idle.as_millis() as u64;

        // IDLE filters server-side, so busy entries at the head cannot hide idle ones.
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(PENDING_SCAN)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Command(format!("XPENDING failed: {e}")))?;

        for entry in pending.ids {
            let action = pending_action(&entry, self.claim_idle, self.max_deliveries);
            if action == PendingAction::Skip {
                continue;
            }

            let claimed: StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&self.stream_key)
                .arg(&self.group)
                .arg(consumer)
                .arg(min_idle_ms)
                .arg(&entry.id)
                .query_async(&mut conn)
                .await
                .map_err(|e| QueueError::Command(format!("XCLAIM failed: {e}")))?;

            // Another consumer may have claimed it first.
            let Some(stream_id) = claimed.ids.into_iter().next() else {
                continue;
            };

            match action {
                PendingAction::Redeliver { attempts } => {
                    let delivery = delivery_from_entry(&stream_id, attempts);
                    debug!(delivery_id = %delivery.delivery_id, attempts, "claimed idle delivery");
                    return Ok(Some(delivery));
                }
                PendingAction::DeadLetter { attempts } => {
                    let delivery = delivery_from_entry(&stream_id, attempts);
                    warn!(
                        delivery_id = %delivery.delivery_id,
                        attempts,
                        "delivery exceeded max deliveries; dead-lettering"
                    );
                    self.dead_letter(&delivery, "max deliveries exceeded").await?;
                }
                PendingAction::Skip => {}
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl JobQueue for RedisStreamsJobQueue {
    #[instrument(skip(self, descriptor), fields(stream_key = %self.stream_key, job_id = %descriptor.id), err)]
    async fn publish(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let payload = descriptor
            .to_json()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let mut conn = self.conn.clone();
        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .arg("content_type")
            .arg(DESCRIPTOR_CONTENT_TYPE)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }

    async fn receive(
        &self,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        if let Some(delivery) = self.claim_idle_entry(consumer).await? {
            return Ok(Some(delivery));
        }

        let mut conn = self.consumer_connection(consumer).await?;
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Command(format!("XREADGROUP failed: {e}")))?;

        Ok(reply
            .and_then(|reply| reply.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next())
            .map(|stream_id| delivery_from_entry(&stream_id, 1)))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&delivery.delivery_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self, delivery), fields(dlq_key = %self.dlq_key, delivery_id = %delivery.delivery_id), err)]
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("XADD")
            .arg(&self.dlq_key)
            .arg("*")
            .arg("original_message_id")
            .arg(&delivery.delivery_id)
            .arg("attempts")
            .arg(delivery.attempts)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg("payload")
            .arg(&delivery.body[..])
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Command(format!("DLQ XADD failed: {e}")))?;

        self.ack(delivery).await
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// What a consumer does with one entry reported by `XPENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    /// Delivered too recently; its consumer may still be working on it.
    Skip,
    /// Claim it and hand it out as delivery number `attempts`.
    Redeliver { attempts: u32 },
    /// Claim it and move it to the DLQ after `attempts` deliveries.
    DeadLetter { attempts: u32 },
}

/// `times_delivered` counts the XREADGROUP delivery too, so an entry is handed
/// out at most `max_deliveries` times in total.
fn pending_action(
    entry: &StreamPendingId,
    claim_idle: Duration,
    max_deliveries: u32,
) -> PendingAction {
    if (entry.last_delivered_ms as u128) < claim_idle.as_millis() {
        return PendingAction::Skip;
    }
    let delivered = u32::try_from(entry.times_delivered).unwrap_or(u32::MAX);
    if delivered >= max_deliveries {
        PendingAction::DeadLetter {
            attempts: delivered,
        }
    } else {
        PendingAction::Redeliver {
            attempts: delivered + 1,
        }
    }
}

fn dlq_key_for(stream_key: &str) -> String {
    format!("{stream_key}:dlq")
}

/// Entries without a `payload` field produce an empty body, which the worker
/// rejects as undecodable.
fn delivery_from_entry(entry: &StreamId, attempts: u32) -> Delivery {
    let body: Vec<u8> = entry.get("payload").unwrap_or_default();
    Delivery {
        delivery_id: entry.id.clone(),
        body,
        attempts,
    }
}
