use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::domain::Notification;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification endpoint answered {status}")]
    Rejected { status: u16 },
    #[error("notification delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel through which a rendered notification reaches the candidate.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Writes the message line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        println!("{}", notification.message);
        Ok(())
    }
}

/// Emits the notification as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            application_id = %notification.application_id,
            user_id = %notification.user_id,
            job_id = %notification.job_id,
            scheduled_at = %notification.scheduled_at,
            message = %notification.message,
            "notification delivered"
        );
        Ok(())
    }
}

/// POSTs the notification as JSON. Any non-2xx answer is a failed delivery.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::applications::ApplicationId;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    fn notification() -> Notification {
        Notification {
            application_id: ApplicationId("a1".to_string()),
            user_id: "u1".to_string(),
            job_id: "j1".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap(),
            message: "User u1: your interview for job j1 is scheduled on 2026-03-03 09:30 UTC"
                .to_string(),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server runs");
        });
        format!("http://{addr}/notify")
    }

    #[tokio::test]
    async fn webhook_posts_the_notification_json() {
        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let router = Router::new()
            .route(
                "/notify",
                post(
                    |State(received): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        received.lock().expect("lock").push(body);
                        StatusCode::NO_CONTENT
                    },
                ),
            )
            .with_state(received.clone());
        let url = serve(router).await;

        let sink = WebhookSink::new(url, Duration::from_secs(2)).expect("client builds");
        sink.deliver(&notification()).await.expect("delivered");

        let bodies = received.lock().expect("lock").clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["user_id"], "u1");
        assert_eq!(bodies[0]["application_id"], "a1");
        assert_eq!(bodies[0]["message"], notification().message);
    }

    #[tokio::test]
    async fn webhook_treats_error_statuses_as_failures() {
        let router = Router::new().route("/notify", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let url = serve(router).await;

        let sink = WebhookSink::new(url, Duration::from_secs(2)).expect("client builds");
        let result = sink.deliver(&notification()).await;

        assert!(matches!(result, Err(DeliveryError::Rejected { status: 503 })));
    }
}
