//! Queue transport carrying job descriptors from intake to workers.
//!
//! The transport is a single durable work queue with competing consumers:
//! every published descriptor is delivered to exactly one consumer at a time.
//!
//! ## Acknowledgment
//!
//! Deliveries are acknowledged **manually**, after the job store update has
//! succeeded. A delivery that is never acknowledged (worker crash, store outage)
//! becomes eligible for redelivery once it has been idle for the claim timeout,
//! which makes processing at-least-once. Job store updates are idempotent on
//! terminal rows, so a duplicate delivery converges to the same final state.
//!
//! Deliveries that keep failing, or that cannot be decoded at all, are moved to a
//! dead-letter queue for inspection instead of being silently dropped.

use std::time::Duration;

use async_trait::async_trait;

use jobpipe_core::JobDescriptor;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

pub use in_memory::{DeadLetter, InMemoryJobQueue};
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsJobQueue;

/// Default number of deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// Default idle time after which an unacknowledged delivery is redelivered.
pub const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(60);

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-assigned id used for `ack` / `dead_letter`.
    pub delivery_id: String,
    /// Raw message body (a JSON-encoded [`JobDescriptor`] when well-formed).
    pub body: Vec<u8>,
    /// How many times this message has been delivered, starting at 1.
    pub attempts: u32,
}

impl Delivery {
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue channel is closed")]
    Closed,

    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable, at-least-once work queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a descriptor to the work queue.
    async fn publish(&self, descriptor: &JobDescriptor) -> Result<(), QueueError>;

    /// Pull at most one delivery for `consumer`, waiting up to `block`.
    ///
    /// Returns `Ok(None)` when nothing arrived within the window.
    async fn receive(
        &self,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<Delivery>, QueueError>;

    /// Mark a delivery as processed; it will not be redelivered.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Move a delivery to the dead-letter queue and acknowledge the original.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Round-trip to the broker; in-process queues report only whether they are closed.
    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
