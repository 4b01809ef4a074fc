use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::applications::ApplicationId;
use crate::workflows::interviews::InterviewRecord;

/// Timestamp layout used in user-facing messages.
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Fact to communicate to a candidate. Consumed and discarded, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(alias = "applicationId")]
    pub application_id: ApplicationId,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "jobId")]
    pub job_id: String,
    #[serde(alias = "scheduledAt")]
    pub scheduled_at: DateTime<Utc>,
}

impl From<InterviewRecord> for NotificationEvent {
    fn from(record: InterviewRecord) -> Self {
        Self {
            application_id: record.application_id,
            user_id: record.user_id,
            job_id: record.job_id,
            scheduled_at: record.scheduled_at,
        }
    }
}

/// Rendered message ready for a delivery sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub application_id: ApplicationId,
    pub user_id: String,
    pub job_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub message: String,
}

pub fn render(event: &NotificationEvent) -> Notification {
    let message = format!(
        "User {}: your interview for job {} is scheduled on {}",
        event.user_id,
        event.job_id,
        event.scheduled_at.format(SCHEDULE_FORMAT)
    );

    Notification {
        application_id: event.application_id.clone(),
        user_id: event.user_id.clone(),
        job_id: event.job_id.clone(),
        scheduled_at: event.scheduled_at,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn message_uses_minute_precision_in_utc() {
        let event = NotificationEvent {
            application_id: ApplicationId("a1".to_string()),
            user_id: "u1".to_string(),
            job_id: "j1".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2026, 1, 5, 7, 3, 59).unwrap(),
        };

        let notification = render(&event);

        assert_eq!(
            notification.message,
            "User u1: your interview for job j1 is scheduled on 2026-01-05 07:03 UTC"
        );
        assert_eq!(notification.scheduled_at, event.scheduled_at);
    }

    #[test]
    fn events_survive_a_json_round_trip() {
        let event = NotificationEvent {
            application_id: ApplicationId("a1".to_string()),
            user_id: "u1".to_string(),
            job_id: "j1".to_string(),
            scheduled_at: Utc
                .with_ymd_and_hms(2026, 1, 5, 7, 3, 59)
                .unwrap()
                .with_nanosecond(987_654_321)
                .unwrap(),
        };

        let encoded = serde_json::to_vec(&event).expect("encode");
        let decoded: NotificationEvent = serde_json::from_slice(&encoded).expect("decode");

        assert_eq!(decoded, event);
        assert_eq!(decoded.scheduled_at.nanosecond(), 987_654_321);
    }
}
