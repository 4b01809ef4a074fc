use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::{dead_letter_queue, Delivery, MessageQueue, QueueError};
use crate::deadline::bounded;

/// Side-effecting reaction to one decoded message.
///
/// Handlers run under at-least-once delivery and must tolerate seeing a message twice.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Message: DeserializeOwned + Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(&self, message: Self::Message) -> Result<(), Self::Error>;

    /// Whether `error` will recur on every redelivery. Such messages are dead-lettered
    /// at once instead of being retried.
    fn is_permanent(&self, _error: &Self::Error) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: String,
    /// Durable consumer group name shared by competing instances.
    pub consumer: String,
    pub max_deliveries: u32,
    pub operation_timeout: Duration,
}

impl ConsumerSettings {
    pub fn new(queue: &str, consumer: &str) -> Self {
        Self {
            queue: queue.to_string(),
            consumer: consumer.to_string(),
            max_deliveries: 5,
            operation_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged,
    Retried,
    /// Moved to the dead-letter queue and acknowledged on the source queue.
    DeadLettered,
    /// Could not be settled; the broker will redeliver it after its ack deadline.
    Unsettled,
}

/// Long-running consumption loop: decode, handle, then acknowledge.
///
/// A delivery is acknowledged only after its handler succeeded. Failed deliveries are
/// retried until `max_deliveries`, then moved to the dead-letter queue. Undecodable
/// payloads and permanent handler failures go straight to the dead-letter queue. No
/// single message can stop the loop.
pub struct ConsumerLoop<Q: ?Sized, H> {
    queue: Arc<Q>,
    handler: Arc<H>,
    settings: ConsumerSettings,
}

impl<Q, H> ConsumerLoop<Q, H>
where
    Q: MessageQueue + ?Sized + 'static,
    H: MessageHandler + 'static,
{
    pub fn new(queue: Arc<Q>, handler: Arc<H>, settings: ConsumerSettings) -> Self {
        Self {
            queue,
            handler,
            settings,
        }
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Consumes until `shutdown` resolves or the broker closes the stream.
    pub async fn run<F>(self, shutdown: F) -> Result<(), QueueError>
    where
        F: Future<Output = ()>,
    {
        let ConsumerSettings {
            queue, consumer, ..
        } = &self.settings;

        self.queue.declare(queue).await?;
        self.queue.declare(&dead_letter_queue(queue)).await?;
        let mut deliveries = self.queue.subscribe(queue, consumer).await?;
        info!(%queue, %consumer, "consumer started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(%queue, %consumer, "consumer stopping");
                    break;
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        self.process(delivery).await;
                    }
                    Some(Err(err)) => {
                        warn!(%queue, error = %err, "failed to receive delivery");
                    }
                    None => {
                        warn!(%queue, "delivery stream closed by broker");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Handles and settles one delivery.
    pub async fn process(&self, delivery: Delivery) -> DeliveryOutcome {
        let queue = self.settings.queue.as_str();
        let attempt = delivery.attempt;

        let message = match serde_json::from_slice::<H::Message>(&delivery.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%queue, attempt, error = %err, "dropping undecodable message");
                if let Err(dlq_err) = self.dead_letter(&delivery).await {
                    error!(%queue, error = %dlq_err, "failed to dead-letter undecodable message");
                }
                return self.ack(delivery).await;
            }
        };

        match self.handler.handle(message).await {
            Ok(()) => {
                debug!(%queue, attempt, "message handled");
                self.ack(delivery).await
            }
            Err(err)
                if attempt >= self.settings.max_deliveries || self.handler.is_permanent(&err) =>
            {
                error!(%queue, attempt, error = %err, "giving up on message");
                match self.dead_letter(&delivery).await {
                    Ok(()) => match self.ack(delivery).await {
                        DeliveryOutcome::Acknowledged => DeliveryOutcome::DeadLettered,
                        other => other,
                    },
                    Err(dlq_err) => {
                        error!(%queue, error = %dlq_err, "failed to dead-letter message");
                        self.retry(delivery).await
                    }
                }
            }
            Err(err) => {
                warn!(%queue, attempt, error = %err, "message handling failed, will retry");
                self.retry(delivery).await
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let target = dead_letter_queue(&delivery.queue);
        bounded(
            self.settings.operation_timeout,
            self.queue.publish(&target, delivery.payload.clone()),
            || QueueError::timed_out("dead_letter", self.settings.operation_timeout),
        )
        .await
    }

    async fn ack(&self, delivery: Delivery) -> DeliveryOutcome {
        let limit = self.settings.operation_timeout;
        match bounded(limit, delivery.ack(), || QueueError::timed_out("ack", limit)).await {
            Ok(()) => DeliveryOutcome::Acknowledged,
            Err(err) => {
                warn!(queue = %self.settings.queue, error = %err, "ack failed, message may be redelivered");
                DeliveryOutcome::Unsettled
            }
        }
    }

    async fn retry(&self, delivery: Delivery) -> DeliveryOutcome {
        let limit = self.settings.operation_timeout;
        match bounded(limit, delivery.retry(), || QueueError::timed_out("retry", limit)).await {
            Ok(()) => DeliveryOutcome::Retried,
            Err(err) => {
                warn!(queue = %self.settings.queue, error = %err, "retry request failed");
                DeliveryOutcome::Unsettled
            }
        }
    }
}
