//! In-memory work queue for tests/dev.
//!
//! Mirrors the Redis Streams semantics closely enough to exercise the worker:
//! FIFO delivery, a pending list of unacknowledged deliveries, redelivery after
//! the claim timeout, and a dead-letter list.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::warn;

use jobpipe_core::JobDescriptor;

use super::{DEFAULT_CLAIM_IDLE, DEFAULT_MAX_DELIVERIES, Delivery, JobQueue, QueueError};

/// A message parked in the dead-letter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub delivery_id: String,
    pub body: Vec<u8>,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug)]
struct Pending {
    body: Vec<u8>,
    attempts: u32,
    delivered_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    closed: bool,
    ready: VecDeque<(String, Vec<u8>)>,
    pending: HashMap<String, Pending>,
    // Preserves redelivery order; entries may be stale after ack.
    pending_order: VecDeque<String>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    notify: Notify,
    next_id: AtomicU64,
    claim_idle: Duration,
    max_deliveries: u32,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_redelivery(DEFAULT_CLAIM_IDLE, DEFAULT_MAX_DELIVERIES)
    }

    /// Queue with explicit redelivery settings (tests use short idle windows).
    pub fn with_redelivery(claim_idle: Duration, max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            claim_idle,
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Simulate a closed channel: every later publish fails.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }

    /// Messages waiting for first delivery.
    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Delivered but not yet acknowledged.
    pub fn pending_len(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state
            .lock()
            .map(|s| s.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Push a raw body, bypassing descriptor encoding (for poison-message tests).
    pub fn publish_raw(&self, body: impl Into<Vec<u8>>) -> Result<String, QueueError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if state.closed {
            return Err(QueueError::Closed);
        }
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.ready.push_back((id.clone(), body.into()));
        drop(state);
        self.notify.notify_one();
        Ok(id)
    }

    fn try_take(&self) -> Result<Option<Delivery>, QueueError> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        let state = &mut *guard;
        let now = Instant::now();

        // Redeliver idle pending entries first, oldest first.
        while let Some(id) = state.pending_order.front().cloned() {
            let Some(entry) = state.pending.get_mut(&id) else {
                state.pending_order.pop_front();
                continue;
            };
            if now.duration_since(entry.delivered_at) < self.claim_idle {
                break;
            }
            state.pending_order.pop_front();

            if entry.attempts < self.max_deliveries {
                entry.attempts += 1;
                entry.delivered_at = now;
                let delivery = Delivery {
                    delivery_id: id.clone(),
                    body: entry.body.clone(),
                    attempts: entry.attempts,
                };
                state.pending_order.push_back(id);
                return Ok(Some(delivery));
            }

            if let Some(entry) = state.pending.remove(&id) {
                warn!(
                    delivery_id = %id,
                    attempts = entry.attempts,
                    "delivery exceeded max deliveries; dead-lettering"
                );
                state.dead_letters.push(DeadLetter {
                    delivery_id: id,
                    body: entry.body,
                    attempts: entry.attempts,
                    reason: "max deliveries exceeded".to_string(),
                });
            }
        }

        let Some((id, body)) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.pending.insert(
            id.clone(),
            Pending {
                body: body.clone(),
                attempts: 1,
                delivered_at: now,
            },
        );
        state.pending_order.push_back(id.clone());
        Ok(Some(Delivery {
            delivery_id: id,
            body,
            attempts: 1,
        }))
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> QueueError {
    QueueError::Command("queue lock poisoned".to_string())
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn publish(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let body = descriptor
            .to_json()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.publish_raw(body).map(|_| ())
    }

    async fn receive(
        &self,
        _consumer: &str,
        block: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            // Register interest before checking so a concurrent publish is not missed.
            let notified = self.notify.notified();
            if let Some(delivery) = self.try_take()? {
                return Ok(Some(delivery));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // Wake periodically so idle pending entries become claimable.
            let wait = (deadline - now).min(self.claim_idle.max(Duration::from_millis(5)));
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.pending.remove(&delivery.delivery_id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.pending.remove(&delivery.delivery_id);
        state.dead_letters.push(DeadLetter {
            delivery_id: delivery.delivery_id.clone(),
            body: delivery.body.clone(),
            attempts: delivery.attempts,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        if state.closed {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobpipe_core::JobId;

    fn descriptor(id: i64) -> JobDescriptor {
        JobDescriptor::new(JobId::new(id), "add", vec!["1".into(), "2".into()])
    }

    const BLOCK: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = InMemoryJobQueue::new();
        queue.publish(&descriptor(1)).await.unwrap();
        queue.publish(&descriptor(2)).await.unwrap();

        let first = queue.receive("w", BLOCK).await.unwrap().unwrap();
        let second = queue.receive("w", BLOCK).await.unwrap().unwrap();

        assert_eq!(JobDescriptor::from_json(&first.body).unwrap().id, JobId::new(1));
        assert_eq!(JobDescriptor::from_json(&second.body).unwrap().id, JobId::new(2));
        assert_eq!(first.attempts, 1);
        assert!(queue.receive("w", BLOCK).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acked_deliveries_are_not_redelivered() {
        let queue = InMemoryJobQueue::with_redelivery(Duration::from_millis(10), 5);
        queue.publish(&descriptor(1)).await.unwrap();

        let delivery = queue.receive("w", BLOCK).await.unwrap().unwrap();
        queue.ack(&delivery).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.receive("w", BLOCK).await.unwrap().is_none());
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn unacked_deliveries_are_redelivered_after_idle_timeout() {
        let queue = InMemoryJobQueue::with_redelivery(Duration::from_millis(10), 5);
        queue.publish(&descriptor(1)).await.unwrap();

        let first = queue.receive("w1", BLOCK).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let again = queue.receive("w2", BLOCK).await.unwrap().unwrap();
        assert_eq!(again.delivery_id, first.delivery_id);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_deliveries_go_to_dead_letter() {
        let queue = InMemoryJobQueue::with_redelivery(Duration::from_millis(5), 2);
        queue.publish(&descriptor(1)).await.unwrap();

        let _ = queue.receive("w", BLOCK).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = queue.receive("w", BLOCK).await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.receive("w", BLOCK).await.unwrap().is_none());

        let dls = queue.dead_letters();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].reason, "max deliveries exceeded");
    }

    #[tokio::test]
    async fn closed_queue_rejects_publish() {
        let queue = InMemoryJobQueue::new();
        queue.close();
        assert!(matches!(
            queue.publish(&descriptor(1)).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn ping_reports_a_closed_queue() {
        let queue = InMemoryJobQueue::new();
        assert!(queue.ping().await.is_ok());

        queue.close();
        assert!(matches!(queue.ping().await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn receive_wakes_up_on_publish() {
        let queue = std::sync::Arc::new(InMemoryJobQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive("w", Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.publish(&descriptor(9)).await.unwrap();

        let delivery = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(JobDescriptor::from_json(&delivery.body).unwrap().id, JobId::new(9));
    }
}
