use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type carried by messages on [`crate::messaging::INTERVIEW_QUEUE`].
pub const APPLICATION_CREATED: &str = "application.created";

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored job application. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "jobId")]
    pub job_id: String,
    #[serde(default, alias = "coverNote")]
    pub cover_note: String,
}

/// Request body for `POST /apply`. Any client supplied `id` is dropped on the floor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "jobId")]
    pub job_id: String,
    #[serde(default, alias = "coverNote")]
    pub cover_note: String,
}

impl ApplicationSubmission {
    pub fn new(user_id: impl Into<String>, job_id: impl Into<String>, cover_note: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            job_id: job_id.into(),
            cover_note: cover_note.into(),
        }
    }

    /// Checks required fields and assigns a fresh identifier.
    pub fn into_record(self, id: ApplicationId) -> Result<ApplicationRecord, SubmissionError> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(SubmissionError::MissingField("user_id"));
        }
        let job_id = self.job_id.trim();
        if job_id.is_empty() {
            return Err(SubmissionError::MissingField("job_id"));
        }

        Ok(ApplicationRecord {
            id,
            user_id: user_id.to_string(),
            job_id: job_id.to_string(),
            cover_note: self.cover_note,
        })
    }
}

/// Rejection raised for submissions that cannot become a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("`{0}` is required")]
    MissingField(&'static str),
    #[error("malformed request body: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_record_trims_identifiers_and_keeps_the_note() {
        let record = ApplicationSubmission::new(" u1 ", "j1\n", "  hi  ")
            .into_record(ApplicationId("a1".to_string()))
            .expect("valid submission");

        assert_eq!(record.user_id, "u1");
        assert_eq!(record.job_id, "j1");
        assert_eq!(record.cover_note, "  hi  ");
    }

    #[test]
    fn user_id_is_checked_before_job_id() {
        let error = ApplicationSubmission::default()
            .into_record(ApplicationId::generate())
            .expect_err("empty submission");
        assert_eq!(error, SubmissionError::MissingField("user_id"));
    }

    #[test]
    fn camel_case_bodies_are_accepted() {
        let submission: ApplicationSubmission =
            serde_json::from_str(r#"{"userId":"u1","jobId":"j1","coverNote":"hi"}"#)
                .expect("decodes");
        assert_eq!(submission, ApplicationSubmission::new("u1", "j1", "hi"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ApplicationId::generate(), ApplicationId::generate());
    }

    #[test]
    fn records_survive_a_json_round_trip() {
        let record = ApplicationRecord {
            id: ApplicationId::generate(),
            user_id: "u1".to_string(),
            job_id: "j1".to_string(),
            cover_note: "Ünïcode, \"quotes\" and\nnewlines".to_string(),
        };

        let encoded = serde_json::to_vec(&record).expect("encode");
        let decoded: ApplicationRecord = serde_json::from_slice(&encoded).expect("decode");

        assert_eq!(decoded, record);
    }
}
