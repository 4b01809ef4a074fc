use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::messaging::{DeliveryStream, InMemoryQueue, MessageQueue, QueueError, INTERVIEW_QUEUE};
use crate::storage::{InMemoryStore, OutboxEntry, OutboxId, OutboxMessage, OutboxStore, StoreError};
use crate::workflows::applications::{
    application_router, ApplicationRecord, ApplicationRepository, ApplicationService,
    ApplicationSubmission,
};

pub(super) fn submission() -> ApplicationSubmission {
    ApplicationSubmission::new("u1", "j1", "hi")
}

pub(super) async fn build_service() -> (
    ApplicationService<InMemoryStore, InMemoryQueue>,
    Arc<InMemoryStore>,
    Arc<InMemoryQueue>,
) {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryQueue::new());
    let service = ApplicationService::new(store.clone(), queue.clone());
    service.prepare().await.expect("queue declared");
    (service, store, queue)
}

pub(super) async fn router_with_memory_backends() -> (axum::Router, Arc<InMemoryStore>, Arc<InMemoryQueue>) {
    let (service, store, queue) = build_service().await;
    (application_router(Arc::new(service)), store, queue)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store whose every call fails as if the database were down.
pub(super) struct UnavailableStore;

#[async_trait]
impl ApplicationRepository for UnavailableStore {
    async fn insert(
        &self,
        _record: ApplicationRecord,
        _event: OutboxMessage,
    ) -> Result<ApplicationRecord, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn list_by_user(&self, _user_id: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl OutboxStore for UnavailableStore {
    async fn pending(&self, _limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn claim(&self, _limit: usize, _lease: Duration) -> Result<Vec<OutboxEntry>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn mark_dispatched(&self, _id: OutboxId) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn record_failure(&self, _id: OutboxId, _error: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Queue that accepts declarations but rejects every publish.
#[derive(Default)]
pub(super) struct RejectingQueue {
    pub(super) inner: InMemoryQueue,
}

#[async_trait]
impl MessageQueue for RejectingQueue {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        self.inner.declare(queue).await
    }

    async fn publish(&self, queue: &str, _payload: Vec<u8>) -> Result<(), QueueError> {
        Err(QueueError::Publish {
            queue: queue.to_string(),
            reason: "broker unreachable".to_string(),
        })
    }

    async fn subscribe(&self, queue: &str, consumer: &str) -> Result<DeliveryStream, QueueError> {
        self.inner.subscribe(queue, consumer).await
    }
}

pub(super) fn decode_published(queue: &InMemoryQueue) -> Vec<ApplicationRecord> {
    queue
        .published(INTERVIEW_QUEUE)
        .iter()
        .map(|payload| serde_json::from_slice(payload).expect("published record decodes"))
        .collect()
}
