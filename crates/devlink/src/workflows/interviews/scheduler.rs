use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::domain::{Clock, InterviewRecord, SchedulePolicy, SystemClock};
use super::repository::InterviewRepository;
use crate::deadline::bounded;
use crate::messaging::{MessageHandler, MessageQueue, QueueError, INTERVIEW_QUEUE, NOTIFICATION_QUEUE};
use crate::storage::StoreError;
use crate::workflows::applications::ApplicationRecord;
use crate::workflows::notifications::NotificationEvent;

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("application event is missing `{0}`")]
    Invalid(&'static str),
    #[error("interview offset {offset} from {processed_at} is out of range")]
    SlotOutOfRange {
        processed_at: chrono::DateTime<chrono::Utc>,
        offset: chrono::Duration,
    },
    #[error("interview store failure: {0}")]
    Storage(#[from] StoreError),
    #[error("failed to publish interview event: {0}")]
    Dispatch(#[from] QueueError),
    #[error("failed to encode interview event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SchedulingError {
    /// Failures that no redelivery can fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SchedulingError::Invalid(_) | SchedulingError::SlotOutOfRange { .. }
        )
    }
}

/// Books one interview per application and announces it on the notification queue.
pub struct InterviewScheduler<R, Q: ?Sized> {
    repository: Arc<R>,
    queue: Arc<Q>,
    clock: Arc<dyn Clock>,
    policy: SchedulePolicy,
    operation_timeout: Duration,
}

impl<R, Q> InterviewScheduler<R, Q>
where
    R: InterviewRepository + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    pub fn new(repository: Arc<R>, queue: Arc<Q>, policy: SchedulePolicy) -> Self {
        Self {
            repository,
            queue,
            clock: Arc::new(SystemClock),
            policy,
            operation_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// Declares the queue consumed and the queue published to.
    pub async fn prepare(&self) -> Result<(), QueueError> {
        let limit = self.operation_timeout;
        for queue in [INTERVIEW_QUEUE, NOTIFICATION_QUEUE] {
            bounded(limit, self.queue.declare(queue), || {
                QueueError::timed_out("declare", limit)
            })
            .await?;
        }
        Ok(())
    }

    /// Stores the interview for `application` and publishes it.
    ///
    /// A redelivered application keeps its original slot; the stored record is
    /// published again so a lost notification can still go out.
    pub async fn schedule(
        &self,
        application: &ApplicationRecord,
    ) -> Result<InterviewRecord, SchedulingError> {
        if application.id.as_str().trim().is_empty() {
            return Err(SchedulingError::Invalid("id"));
        }
        if application.user_id.trim().is_empty() {
            return Err(SchedulingError::Invalid("user_id"));
        }
        if application.job_id.trim().is_empty() {
            return Err(SchedulingError::Invalid("job_id"));
        }

        let limit = self.operation_timeout;
        let processed_at = self.clock.now();
        let slot = self
            .policy
            .slot_after(processed_at)
            .ok_or(SchedulingError::SlotOutOfRange {
                processed_at,
                offset: self.policy.offset(),
            })?;
        let candidate = InterviewRecord::for_application(application, slot);

        let upserted = bounded(limit, self.repository.upsert(candidate), || {
            StoreError::timed_out("upsert_interview", limit)
        })
        .await?;

        if upserted.is_new() {
            info!(
                application_id = %application.id,
                scheduled_at = %upserted.record().scheduled_at,
                "interview scheduled"
            );
        } else {
            debug!(application_id = %application.id, "interview already scheduled, republishing");
        }

        let interview = upserted.into_record();
        let payload = serde_json::to_vec(&NotificationEvent::from(interview.clone()))?;
        bounded(limit, self.queue.publish(NOTIFICATION_QUEUE, payload), || {
            QueueError::timed_out("publish", limit)
        })
        .await?;

        Ok(interview)
    }
}

#[async_trait]
impl<R, Q> MessageHandler for InterviewScheduler<R, Q>
where
    R: InterviewRepository + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    type Message = ApplicationRecord;
    type Error = SchedulingError;

    async fn handle(&self, message: ApplicationRecord) -> Result<(), SchedulingError> {
        self.schedule(&message).await.map(|_| ())
    }

    fn is_permanent(&self, error: &SchedulingError) -> bool {
        error.is_permanent()
    }
}
