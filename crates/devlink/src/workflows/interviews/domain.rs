use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::applications::{ApplicationId, ApplicationRecord};

/// Event type carried by messages on [`crate::messaging::NOTIFICATION_QUEUE`].
pub const INTERVIEW_SCHEDULED: &str = "interview.scheduled";

/// Interview slot booked for an application. One per `application_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewRecord {
    #[serde(alias = "applicationId")]
    pub application_id: ApplicationId,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "jobId")]
    pub job_id: String,
    #[serde(alias = "scheduledAt")]
    pub scheduled_at: DateTime<Utc>,
}

impl InterviewRecord {
    pub fn for_application(application: &ApplicationRecord, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            application_id: application.id.clone(),
            user_id: application.user_id.clone(),
            job_id: application.job_id.clone(),
            scheduled_at,
        }
    }
}

/// Source of "now" for scheduling decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Business rule placing every interview a fixed offset after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    offset: Duration,
}

impl SchedulePolicy {
    pub fn new(offset: Duration) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// `None` when the slot falls outside the representable calendar.
    pub fn slot_after(&self, processed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        processed_at.checked_add_signed(self.offset)
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::new(Duration::hours(48))
    }
}
