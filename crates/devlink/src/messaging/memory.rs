use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Acknowledge, Delivery, DeliveryStream, MessageQueue, QueueError};

#[derive(Debug)]
struct Envelope {
    payload: Vec<u8>,
    attempt: u32,
}

#[derive(Debug)]
struct Channel {
    name: String,
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    published: Mutex<Vec<Vec<u8>>>,
    acked: AtomicUsize,
    retried: AtomicUsize,
}

impl Channel {
    fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            published: Mutex::new(Vec::new()),
            acked: AtomicUsize::new(0),
            retried: AtomicUsize::new(0),
        }
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), QueueError> {
        self.sender.send(envelope).map_err(|_| QueueError::Publish {
            queue: self.name.clone(),
            reason: "channel closed".to_string(),
        })
    }
}

/// Process-local queue with the same contract as the broker: durable for the life of
/// the process, competing consumers, redelivery on `retry`.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, queue: &str) -> Result<Arc<Channel>, QueueError> {
        let channels = self
            .channels
            .lock()
            .map_err(|_| QueueError::Connection("in-memory queue lock poisoned".to_string()))?;
        channels
            .get(queue)
            .cloned()
            .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))
    }

    /// Every payload published to `queue`, in publish order.
    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.channel(queue)
            .ok()
            .and_then(|channel| channel.published.lock().ok().map(|items| items.clone()))
            .unwrap_or_default()
    }

    pub fn acked(&self, queue: &str) -> usize {
        self.channel(queue)
            .map(|channel| channel.acked.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    pub fn retried(&self, queue: &str) -> usize {
        self.channel(queue)
            .map(|channel| channel.retried.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| QueueError::Connection("in-memory queue lock poisoned".to_string()))?;
        channels
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Channel::new(queue)));
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let channel = self.channel(queue)?;
        if let Ok(mut published) = channel.published.lock() {
            published.push(payload.clone());
        }
        channel.enqueue(Envelope {
            payload,
            attempt: 1,
        })
    }

    async fn subscribe(&self, queue: &str, _consumer: &str) -> Result<DeliveryStream, QueueError> {
        let channel = self.channel(queue)?;
        let stream = futures::stream::unfold(channel, |channel| async move {
            let envelope = {
                let mut receiver = channel.receiver.lock().await;
                receiver.recv().await
            }?;
            let delivery = Delivery::new(
                channel.name.clone(),
                envelope.payload.clone(),
                envelope.attempt,
                MemoryAck {
                    channel: channel.clone(),
                    payload: envelope.payload,
                    attempt: envelope.attempt,
                },
            );
            Some((Ok(delivery), channel))
        });
        Ok(Box::pin(stream))
    }
}

struct MemoryAck {
    channel: Arc<Channel>,
    payload: Vec<u8>,
    attempt: u32,
}

#[async_trait]
impl Acknowledge for MemoryAck {
    async fn ack(&self) -> Result<(), QueueError> {
        self.channel.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn retry(&self) -> Result<(), QueueError> {
        self.channel.retried.fetch_add(1, Ordering::SeqCst);
        self.channel.enqueue(Envelope {
            payload: self.payload.clone(),
            attempt: self.attempt + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn publish_requires_a_declared_queue() {
        let queue = InMemoryQueue::new();
        let result = queue.publish("missing", b"{}".to_vec()).await;
        assert!(matches!(result, Err(QueueError::NotDeclared(name)) if name == "missing"));
    }

    #[tokio::test]
    async fn declaring_twice_keeps_pending_messages() {
        let queue = InMemoryQueue::new();
        queue.declare("jobs").await.expect("declare");
        queue.publish("jobs", b"one".to_vec()).await.expect("publish");
        queue.declare("jobs").await.expect("redeclare");

        let mut deliveries = queue.subscribe("jobs", "worker").await.expect("subscribe");
        let delivery = deliveries.next().await.expect("item").expect("delivery");
        assert_eq!(delivery.payload, b"one".to_vec());
        assert_eq!(delivery.attempt, 1);
    }

    #[tokio::test]
    async fn retry_redelivers_with_a_higher_attempt() {
        let queue = InMemoryQueue::new();
        queue.declare("jobs").await.expect("declare");
        queue.publish("jobs", b"one".to_vec()).await.expect("publish");
        let mut deliveries = queue.subscribe("jobs", "worker").await.expect("subscribe");

        let first = deliveries.next().await.expect("item").expect("delivery");
        first.retry().await.expect("retry");
        let second = deliveries.next().await.expect("item").expect("delivery");
        assert_eq!(second.attempt, 2);
        second.ack().await.expect("ack");

        assert_eq!(queue.retried("jobs"), 1);
        assert_eq!(queue.acked("jobs"), 1);
        assert_eq!(queue.published("jobs").len(), 1);
    }

    #[tokio::test]
    async fn competing_consumers_split_the_queue() {
        let queue = InMemoryQueue::new();
        queue.declare("jobs").await.expect("declare");
        for payload in [b"a".to_vec(), b"b".to_vec()] {
            queue.publish("jobs", payload).await.expect("publish");
        }

        let mut first = queue.subscribe("jobs", "worker").await.expect("subscribe");
        let mut second = queue.subscribe("jobs", "worker").await.expect("subscribe");
        let a = first.next().await.expect("item").expect("delivery");
        let b = second.next().await.expect("item").expect("delivery");

        assert_ne!(a.payload, b.payload);
    }
}
