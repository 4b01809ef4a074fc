use async_trait::async_trait;

use super::domain::ApplicationRecord;
use crate::storage::{OutboxMessage, StoreError};

/// Storage for submitted applications.
///
/// `insert` persists the record and its pending event in one transaction, so an
/// event exists for every stored application and never for one that was not stored.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn insert(
        &self,
        record: ApplicationRecord,
        event: OutboxMessage,
    ) -> Result<ApplicationRecord, StoreError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, StoreError>;
}
