//! Durable queue contract used by the pipeline stages.
//!
//! # Delivery semantics
//!
//! - **Durable**: queues are declared before use; declaring an existing queue is a no-op.
//! - **At-least-once**: a [`Delivery`] is redelivered until it is acknowledged, so
//!   handlers must be idempotent.
//! - **Competing consumers**: subscribers sharing a consumer name split the queue between
//!   them; each delivery attempt goes to exactly one of them.
//!
//! Consumers acknowledge only after their side effects have completed; see
//! [`ConsumerLoop`].

pub mod consumer;
pub mod jetstream;
pub mod memory;

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

pub use consumer::{ConsumerLoop, ConsumerSettings, DeliveryOutcome, MessageHandler};
pub use jetstream::JetStreamQueue;
pub use memory::InMemoryQueue;

/// Carries `application.created` events from intake to scheduling.
pub const INTERVIEW_QUEUE: &str = "interview_queue";
/// Carries `interview.scheduled` events from scheduling to notification delivery.
pub const NOTIFICATION_QUEUE: &str = "notification_queue";

/// Queue receiving messages a consumer gave up on.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}_dead_letter")
}

/// Errors raised by queue clients.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("queue '{0}' has not been declared")]
    NotDeclared(String),
    #[error("declare failed for queue '{queue}': {reason}")]
    Declare { queue: String, reason: String },
    #[error("publish failed for queue '{queue}': {reason}")]
    Publish { queue: String, reason: String },
    #[error("subscription failed for queue '{queue}': {reason}")]
    Subscribe { queue: String, reason: String },
    #[error("acknowledgement failed: {0}")]
    Acknowledge(String),
    #[error("queue operation `{operation}` timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
}

impl QueueError {
    pub(crate) fn timed_out(operation: &'static str, limit: Duration) -> Self {
        Self::Timeout { operation, limit }
    }
}

/// Stream of deliveries produced by [`MessageQueue::subscribe`].
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, QueueError>> + Send>>;

/// Client side of a durable, at-least-once queue service.
///
/// Implementations are shared across request handlers and must be safe for concurrent use.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn declare(&self, queue: &str) -> Result<(), QueueError>;

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Joins the named competing-consumer group on `queue`.
    async fn subscribe(&self, queue: &str, consumer: &str) -> Result<DeliveryStream, QueueError>;
}

/// Broker-specific settlement of a single delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), QueueError>;

    /// Returns the message to the queue for another attempt.
    async fn retry(&self) -> Result<(), QueueError>;
}

/// A message handed to a consumer, settled exactly once through `ack` or `retry`.
pub struct Delivery {
    pub queue: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
    handle: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        payload: Vec<u8>,
        attempt: u32,
        handle: impl Acknowledge + 'static,
    ) -> Self {
        Self {
            queue: queue.into(),
            payload,
            attempt,
            handle: Box::new(handle),
        }
    }

    pub async fn ack(self) -> Result<(), QueueError> {
        self.handle.ack().await
    }

    pub async fn retry(self) -> Result<(), QueueError> {
        self.handle.retry().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("attempt", &self.attempt)
            .field("payload_bytes", &self.payload.len())
            .finish()
    }
}
