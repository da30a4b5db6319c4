//! InMemoryWorkQueue - SQS 風のインメモリ配送キュー
//!
//! - 受信したメッセージは visibility timeout の間だけ不可視（in-flight）
//! - ack されないまま期限が来たら ready に戻す（再配送）
//! - `max_receive_count` 回受信されても ack されなければ dead-letter へ
//! - 期限切れ後の ack は `StaleReceipt`

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use ulid::Ulid;

use crate::domain::{DispatchMessage, QueueError};
use crate::ports::{Delivery, WorkQueue};

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout: Duration,

    /// Receives without ack before a message is dead-lettered.
    pub max_receive_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(120),
            max_receive_count: 5,
        }
    }
}

/// Snapshot of queue depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub ready: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// A message that exhausted its receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: String,
    pub receive_count: u32,
}

#[derive(Debug, Clone)]
struct Message {
    id: String,
    body: String,
    receive_count: u32,
}

struct InFlight {
    message: Message,
    receipt: String,
}

/// Visibility expiry entry. Reverse ordering so BinaryHeap acts as a min-heap.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Expiry {
    visible_at: Instant,
    message_id: String,
    receipt: String,
}

impl PartialOrd for Expiry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expiry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.visible_at.cmp(&self.visible_at)
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<String, InFlight>,
    expiries: BinaryHeap<Expiry>,
    dead: Vec<DeadLetter>,
}

impl QueueState {
    /// Return lapsed in-flight messages to `ready`, or dead-letter them.
    fn release_expired(&mut self, now: Instant, max_receive_count: u32) {
        while let Some(entry) = self.expiries.peek() {
            if entry.visible_at > now {
                break;
            }
            let Some(entry) = self.expiries.pop() else {
                break;
            };
            // 既に ack 済み、または新しい receipt で再受信されたものは無視
            let current = self
                .in_flight
                .get(&entry.message_id)
                .is_some_and(|f| f.receipt == entry.receipt);
            if !current {
                continue;
            }
            let Some(flight) = self.in_flight.remove(&entry.message_id) else {
                continue;
            };
            let message = flight.message;
            if message.receive_count >= max_receive_count {
                tracing::warn!(
                    message_id = %message.id,
                    receive_count = message.receive_count,
                    "message exhausted its receives, dead-lettering"
                );
                self.dead.push(DeadLetter {
                    message_id: message.id,
                    body: message.body,
                    receive_count: message.receive_count,
                });
            } else {
                self.ready.push_back(message);
            }
        }
    }

    fn depth(&self) -> QueueDepth {
        QueueDepth {
            ready: self.ready.len(),
            in_flight: self.in_flight.len(),
            dead_lettered: self.dead.len(),
        }
    }
}

/// In-memory work queue.
pub struct InMemoryWorkQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    config: QueueConfig,
    unavailable: AtomicBool,
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl InMemoryWorkQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            config,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Toggle a simulated outage.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub async fn depth(&self) -> QueueDepth {
        let mut state = self.state.lock().await;
        state.release_expired(Instant::now(), self.config.max_receive_count);
        state.depth()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        let mut state = self.state.lock().await;
        state.release_expired(Instant::now(), self.config.max_receive_count);
        state.dead.clone()
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("in-memory queue is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        self.check_available()?;
        let body = message.encode()?;
        let id = Ulid::new().to_string();
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(Message {
                id: id.clone(),
                body,
                receive_count: 0,
            });
        }
        tracing::debug!(message_id = %id, job_id = %message.id, "message enqueued");
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        self.check_available()?;
        let deadline = Instant::now() + wait;
        loop {
            let next_wake = {
                let now = Instant::now();
                let mut state = self.state.lock().await;
                state.release_expired(now, self.config.max_receive_count);

                if let Some(mut message) = state.ready.pop_front() {
                    message.receive_count += 1;
                    let receipt = Ulid::new().to_string();
                    state.expiries.push(Expiry {
                        visible_at: now + self.config.visibility_timeout,
                        message_id: message.id.clone(),
                        receipt: receipt.clone(),
                    });
                    state.in_flight.insert(
                        message.id.clone(),
                        InFlight {
                            message: message.clone(),
                            receipt: receipt.clone(),
                        },
                    );
                    return Ok(Some(Box::new(InMemoryDelivery {
                        message_id: message.id,
                        receipt,
                        body: message.body,
                        receive_count: message.receive_count,
                        state: Arc::clone(&self.state),
                    })));
                }

                if now >= deadline {
                    return Ok(None);
                }
                match state.expiries.peek() {
                    Some(entry) if entry.visible_at < deadline => entry.visible_at,
                    _ => deadline,
                }
            };

            // 新着通知 または 次の期限 / long-poll の締め切りまで待つ
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(next_wake) => {},
            }
        }
    }
}

/// Delivery handle for `InMemoryWorkQueue`.
struct InMemoryDelivery {
    message_id: String,
    receipt: String,
    body: String,
    receive_count: u32,
    state: Arc<Mutex<QueueState>>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn message_id(&self) -> &str {
        &self.message_id
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn receive_count(&self) -> u32 {
        self.receive_count
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let current = state
            .in_flight
            .get(&self.message_id)
            .is_some_and(|f| f.receipt == self.receipt);
        // 期限切れで ready に戻った or 別の受信者が持っている
        if !current {
            return Err(QueueError::StaleReceipt(self.message_id.clone()));
        }
        state.in_flight.remove(&self.message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobParams};

    fn message(id: &str) -> DispatchMessage {
        DispatchMessage::new(JobId::parse(id).unwrap(), JobParams::new().with("op_a", true))
    }

    fn short(visibility_ms: u64, max_receive_count: u32) -> InMemoryWorkQueue {
        InMemoryWorkQueue::new(QueueConfig {
            visibility_timeout: Duration::from_millis(visibility_ms),
            max_receive_count,
        })
    }

    #[tokio::test]
    async fn dequeue_returns_encoded_body() {
        let queue = InMemoryWorkQueue::default();
        queue.enqueue(&message("job-1")).await.unwrap();

        let delivery = queue
            .dequeue(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        let decoded = DispatchMessage::decode(delivery.body()).unwrap();
        assert_eq!(decoded, message("job-1"));
        assert_eq!(delivery.receive_count(), 1);

        let depth = queue.depth().await;
        assert_eq!(depth.ready, 0);
        assert_eq!(depth.in_flight, 1);

        delivery.ack().await.unwrap();
        assert_eq!(queue.depth().await, QueueDepth::default());
    }

    #[tokio::test]
    async fn empty_queue_times_out_with_none() {
        let queue = InMemoryWorkQueue::default();
        let got = queue.dequeue(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn long_poll_wakes_on_enqueue() {
        let queue = Arc::new(InMemoryWorkQueue::default());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(&message("job-1")).await.unwrap();

        let delivery = waiter.await.unwrap().unwrap();
        assert!(delivery.is_some());
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_visibility_timeout() {
        let queue = short(30, 5);
        queue.enqueue(&message("job-1")).await.unwrap();

        let first = queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        let first_id = first.message_id().to_string();
        drop(first);

        assert!(queue.dequeue(Duration::from_millis(5)).await.unwrap().is_none());

        let second = queue
            .dequeue(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.message_id(), first_id);
        assert_eq!(second.receive_count(), 2);
    }

    #[tokio::test]
    async fn late_ack_is_stale() {
        let queue = short(20, 5);
        queue.enqueue(&message("job-1")).await.unwrap();
        let delivery = queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let err = delivery.ack().await.unwrap_err();
        assert!(matches!(err, QueueError::StaleReceipt(_)));
        assert_eq!(queue.depth().await.ready, 1);
    }

    #[tokio::test]
    async fn exhausted_message_is_dead_lettered() {
        let queue = short(10, 2);
        queue.enqueue(&message("job-1")).await.unwrap();

        for expected in 1..=2 {
            let delivery = queue
                .dequeue(Duration::from_millis(100))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.receive_count(), expected);
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(queue.dequeue(Duration::from_millis(5)).await.unwrap().is_none());

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].receive_count, 2);
        assert_eq!(
            queue.depth().await,
            QueueDepth {
                ready: 0,
                in_flight: 0,
                dead_lettered: 1
            }
        );
    }

    #[tokio::test]
    async fn outage_rejects_enqueue() {
        let queue = InMemoryWorkQueue::default();
        queue.set_unavailable(true);
        let err = queue.enqueue(&message("job-1")).await.unwrap_err();
        assert!(matches!(err, QueueError::Unavailable(_)));
    }
}
