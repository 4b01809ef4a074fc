use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::domain::{render, NotificationEvent};
use super::sink::{DeliveryError, NotificationSink};
use crate::deadline::bounded;
use crate::messaging::MessageHandler;

/// Renders `interview.scheduled` events and hands them to a sink.
///
/// Delivery is at-least-once: a redelivered event is sent again.
pub struct NotificationDispatcher<S: ?Sized> {
    sink: Arc<S>,
    delivery_timeout: Duration,
}

impl<S> NotificationDispatcher<S>
where
    S: NotificationSink + ?Sized + 'static,
{
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            delivery_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    pub async fn dispatch(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        let notification = render(event);
        let limit = self.delivery_timeout;
        bounded(limit, self.sink.deliver(&notification), || {
            DeliveryError::Timeout(limit)
        })
        .await?;
        debug!(application_id = %event.application_id, "notification dispatched");
        Ok(())
    }
}

#[async_trait]
impl<S> MessageHandler for NotificationDispatcher<S>
where
    S: NotificationSink + ?Sized + 'static,
{
    type Message = NotificationEvent;
    type Error = DeliveryError;

    async fn handle(&self, message: NotificationEvent) -> Result<(), DeliveryError> {
        self.dispatch(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{
        dead_letter_queue, ConsumerLoop, ConsumerSettings, DeliveryOutcome, InMemoryQueue,
        MessageQueue, NOTIFICATION_QUEUE,
    };
    use crate::workflows::applications::ApplicationId;
    use crate::workflows::notifications::Notification;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Rejected { status: 500 });
            }
            self.delivered.lock().expect("lock").push(notification.clone());
            Ok(())
        }
    }

    struct StalledSink;

    #[async_trait]
    impl NotificationSink for StalledSink {
        async fn deliver(&self, _notification: &Notification) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn event() -> NotificationEvent {
        NotificationEvent {
            application_id: ApplicationId("a1".to_string()),
            user_id: "u1".to_string(),
            job_id: "j1".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn renders_and_delivers_the_event() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = NotificationDispatcher::new(sink.clone());

        dispatcher.dispatch(&event()).await.expect("dispatched");

        let delivered = sink.delivered.lock().expect("lock").clone();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            delivered[0].message,
            "User u1: your interview for job j1 is scheduled on 2026-03-03 09:30 UTC"
        );
    }

    #[tokio::test]
    async fn stalled_sinks_time_out() {
        let dispatcher = NotificationDispatcher::new(Arc::new(StalledSink))
            .with_delivery_timeout(Duration::from_millis(20));

        let result = dispatcher.dispatch(&event()).await;

        assert!(matches!(result, Err(DeliveryError::Timeout(_))));
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_not_acknowledged() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.declare(NOTIFICATION_QUEUE).await.expect("declare");
        queue
            .declare(&dead_letter_queue(NOTIFICATION_QUEUE))
            .await
            .expect("declare dlq");
        let payload = serde_json::to_vec(&event()).expect("encode");
        queue.publish(NOTIFICATION_QUEUE, payload).await.expect("publish");

        let sink = Arc::new(RecordingSink {
            delivered: Mutex::new(Vec::new()),
            fail: true,
        });
        let consumer = ConsumerLoop::new(
            queue.clone(),
            Arc::new(NotificationDispatcher::new(sink)),
            ConsumerSettings::new(NOTIFICATION_QUEUE, "notifications"),
        );
        let mut deliveries = queue
            .subscribe(NOTIFICATION_QUEUE, "notifications")
            .await
            .expect("subscribe");
        let delivery = deliveries.next().await.expect("item").expect("delivery");

        assert_eq!(consumer.process(delivery).await, DeliveryOutcome::Retried);
        assert_eq!(queue.acked(NOTIFICATION_QUEUE), 0);
    }

    #[tokio::test]
    async fn accepts_camel_case_events() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = NotificationDispatcher::new(sink.clone());
        let event: NotificationEvent = serde_json::from_str(
            r#"{"applicationId":"a9","userId":"u9","jobId":"j9","scheduledAt":"2026-01-02T03:04:00Z"}"#,
        )
        .expect("decodes");

        dispatcher.handle(event).await.expect("handled");

        let delivered = sink.delivered.lock().expect("lock").clone();
        assert_eq!(
            delivered[0].message,
            "User u9: your interview for job j9 is scheduled on 2026-01-02 03:04 UTC"
        );
    }
}
