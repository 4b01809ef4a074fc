use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationSubmission, SubmissionError, APPLICATION_CREATED,
};
use super::repository::ApplicationRepository;
use crate::deadline::bounded;
use crate::messaging::{MessageQueue, QueueError, INTERVIEW_QUEUE};
use crate::storage::{OutboxMessage, OutboxStore, StoreError};

/// Service accepting applications and emitting `application.created` events.
pub struct ApplicationService<R, Q: ?Sized> {
    repository: Arc<R>,
    queue: Arc<Q>,
    operation_timeout: Duration,
}

impl<R, Q> ApplicationService<R, Q>
where
    R: ApplicationRepository + OutboxStore + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    pub fn new(repository: Arc<R>, queue: Arc<Q>) -> Self {
        Self {
            repository,
            queue,
            operation_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// Declares the queue this stage publishes to.
    pub async fn prepare(&self) -> Result<(), QueueError> {
        let limit = self.operation_timeout;
        bounded(limit, self.queue.declare(INTERVIEW_QUEUE), || {
            QueueError::timed_out("declare", limit)
        })
        .await
    }

    /// Validate, persist, then publish a new application.
    ///
    /// Nothing is published unless the record was stored. A publish failure leaves the
    /// record stored and its outbox entry pending.
    pub async fn submit(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let limit = self.operation_timeout;
        let record = submission.into_record(ApplicationId::generate())?;
        let payload = serde_json::to_vec(&record)?;
        let event = OutboxMessage::new(INTERVIEW_QUEUE, APPLICATION_CREATED, payload.clone());
        let outbox_id = event.id;

        let stored = bounded(limit, self.repository.insert(record, event), || {
            StoreError::timed_out("insert_application", limit)
        })
        .await?;
        info!(
            application_id = %stored.id,
            user_id = %stored.user_id,
            job_id = %stored.job_id,
            "application stored"
        );

        let published = bounded(limit, self.queue.publish(INTERVIEW_QUEUE, payload), || {
            QueueError::timed_out("publish", limit)
        })
        .await;

        if let Err(source) = published {
            warn!(application_id = %stored.id, error = %source, "application event left in outbox");
            let reason = source.to_string();
            if let Err(err) = bounded(
                limit,
                self.repository.record_failure(outbox_id, &reason),
                || StoreError::timed_out("record_outbox_failure", limit),
            )
            .await
            {
                warn!(%outbox_id, error = %err, "failed to record outbox failure");
            }
            return Err(ApplicationServiceError::Dispatch {
                application_id: stored.id,
                source,
            });
        }

        if let Err(err) = bounded(limit, self.repository.mark_dispatched(outbox_id), || {
            StoreError::timed_out("mark_dispatched", limit)
        })
        .await
        {
            // The relay will publish the event a second time; consumers are idempotent.
            warn!(%outbox_id, error = %err, "failed to mark outbox entry dispatched");
        }

        info!(application_id = %stored.id, queue = INTERVIEW_QUEUE, "application event published");
        Ok(stored)
    }

    /// All applications submitted by `user_id`, oldest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, ApplicationServiceError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SubmissionError::MissingField("user_id").into());
        }

        let limit = self.operation_timeout;
        let records = bounded(limit, self.repository.list_by_user(user_id), || {
            StoreError::timed_out("list_applications", limit)
        })
        .await?;
        Ok(records)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Invalid(#[from] SubmissionError),
    #[error("application store failure: {0}")]
    Storage(#[from] StoreError),
    #[error("application {application_id} was stored but its event was not published: {source}")]
    Dispatch {
        application_id: ApplicationId,
        source: QueueError,
    },
    #[error("failed to encode application event: {0}")]
    Encode(#[from] serde_json::Error),
}
