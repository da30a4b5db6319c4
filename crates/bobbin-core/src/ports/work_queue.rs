//! WorkQueue port - 配送キュー（SQS 相当 または InMemory）
//!
//! # 設計原則
//! - at-least-once 配送（重複・順序入れ替わりがありうる）
//! - body はエンコード済みの `DispatchMessage`（デコードは worker 側）
//! - ack されなかったメッセージは visibility timeout 後に再配送
//! - 再配送回数の上限を超えたら dead-letter へ

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DispatchMessage, QueueError};

/// One delivery of a message. The worker owns it and acknowledges it when done.
///
/// Dropping a delivery without `ack` leaves the message invisible until its
/// visibility window lapses; then it is delivered again.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Queue-assigned id of the underlying message (stable across redeliveries).
    fn message_id(&self) -> &str;

    /// Raw message body.
    fn body(&self) -> &str;

    /// How many times this message has been received, including this one.
    fn receive_count(&self) -> u32;

    /// Remove the message from the queue.
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;
}

/// Queue port (interface).
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a dispatch message.
    async fn enqueue(&self, message: &DispatchMessage) -> Result<(), QueueError>;

    /// Wait up to `wait` for a message. `Ok(None)` means nothing arrived.
    async fn dequeue(&self, wait: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError>;
}
