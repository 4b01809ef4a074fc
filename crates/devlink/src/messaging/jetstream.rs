use std::time::Duration;

use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info};

use super::{Acknowledge, Delivery, DeliveryStream, MessageQueue, QueueError};

/// NATS JetStream client. Each queue maps to a file-backed work-queue stream whose only
/// subject is the queue name, consumed through a durable pull consumer.
#[derive(Clone)]
pub struct JetStreamQueue {
    context: jetstream::Context,
    max_deliveries: u32,
    ack_wait: Duration,
}

impl JetStreamQueue {
    pub async fn connect(url: &str, max_deliveries: u32) -> Result<Self, QueueError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|err| QueueError::Connection(err.to_string()))?;
        info!(%url, "connected to broker");
        Ok(Self::new(jetstream::new(client), max_deliveries))
    }

    pub fn new(context: jetstream::Context, max_deliveries: u32) -> Self {
        Self {
            context,
            max_deliveries: max_deliveries.max(1),
            ack_wait: Duration::from_secs(30),
        }
    }

    fn stream_name(queue: &str) -> String {
        queue.to_ascii_uppercase()
    }
}

#[async_trait]
impl MessageQueue for JetStreamQueue {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        let config = StreamConfig {
            name: Self::stream_name(queue),
            subjects: vec![queue.to_string()],
            retention: RetentionPolicy::WorkQueue,
            storage: StorageType::File,
            ..Default::default()
        };

        self.context
            .get_or_create_stream(config)
            .await
            .map_err(|err| QueueError::Declare {
                queue: queue.to_string(),
                reason: err.to_string(),
            })?;
        debug!(queue, "queue declared");
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let publish_error = |reason: String| QueueError::Publish {
            queue: queue.to_string(),
            reason,
        };

        let ack = self
            .context
            .publish(queue.to_string(), payload.into())
            .await
            .map_err(|err| publish_error(err.to_string()))?;
        // The broker acknowledges once the message is persisted in the stream.
        ack.await.map_err(|err| publish_error(err.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, queue: &str, consumer: &str) -> Result<DeliveryStream, QueueError> {
        let subscribe_error = |reason: String| QueueError::Subscribe {
            queue: queue.to_string(),
            reason,
        };

        let stream = self
            .context
            .get_stream(Self::stream_name(queue))
            .await
            .map_err(|err| subscribe_error(err.to_string()))?;

        let pull: PullConsumer = stream
            .get_or_create_consumer(
                consumer,
                PullConsumerConfig {
                    durable_name: Some(consumer.to_string()),
                    deliver_policy: DeliverPolicy::All,
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.ack_wait,
                    max_deliver: i64::from(self.max_deliveries),
                    ..Default::default()
                },
            )
            .await
            .map_err(|err| subscribe_error(err.to_string()))?;

        let messages = pull
            .messages()
            .await
            .map_err(|err| subscribe_error(err.to_string()))?;

        let queue = queue.to_string();
        let deliveries = messages.map(move |result| match result {
            Ok(message) => {
                let attempt = message
                    .info()
                    .map(|info| u32::try_from(info.delivered).unwrap_or(1).max(1))
                    .unwrap_or(1);
                let payload = message.payload.to_vec();
                Ok(Delivery::new(
                    queue.clone(),
                    payload,
                    attempt,
                    JetStreamAck { message },
                ))
            }
            Err(err) => Err(QueueError::Subscribe {
                queue: queue.clone(),
                reason: err.to_string(),
            }),
        });

        Ok(Box::pin(deliveries))
    }
}

struct JetStreamAck {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledge for JetStreamAck {
    async fn ack(&self) -> Result<(), QueueError> {
        self.message
            .ack()
            .await
            .map_err(|err| QueueError::Acknowledge(err.to_string()))
    }

    async fn retry(&self) -> Result<(), QueueError> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|err| QueueError::Acknowledge(err.to_string()))
    }
}
