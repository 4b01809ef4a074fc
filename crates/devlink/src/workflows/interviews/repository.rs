use async_trait::async_trait;

use super::domain::InterviewRecord;
use crate::storage::StoreError;
use crate::workflows::applications::ApplicationId;

/// Result of writing an interview keyed on its application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    Created(InterviewRecord),
    /// A record already existed; it is returned untouched.
    Existing(InterviewRecord),
}

impl Upserted {
    pub fn record(&self) -> &InterviewRecord {
        match self {
            Upserted::Created(record) | Upserted::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> InterviewRecord {
        match self {
            Upserted::Created(record) | Upserted::Existing(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}

/// Storage for interview slots, deduplicated on `application_id`.
#[async_trait]
pub trait InterviewRepository: Send + Sync {
    async fn upsert(&self, record: InterviewRecord) -> Result<Upserted, StoreError>;

    async fn fetch(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<InterviewRecord>, StoreError>;
}
