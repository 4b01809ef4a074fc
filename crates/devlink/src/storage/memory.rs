use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::outbox::{lease_delta, OutboxEntry, OutboxId, OutboxMessage, OutboxStore};
use super::StoreError;
use crate::workflows::applications::{ApplicationId, ApplicationRecord, ApplicationRepository};
use crate::workflows::interviews::{InterviewRecord, InterviewRepository, Upserted};

#[derive(Debug, Default)]
struct StoreState {
    applications: Vec<ApplicationRecord>,
    interviews: BTreeMap<ApplicationId, InterviewRecord>,
    outbox: Vec<OutboxEntry>,
}

/// Process-local store. One lock guards every collection, which makes the
/// record + outbox write atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    pub fn applications(&self) -> Vec<ApplicationRecord> {
        self.lock()
            .map(|state| state.applications.clone())
            .unwrap_or_default()
    }

    pub fn interviews(&self) -> Vec<InterviewRecord> {
        self.lock()
            .map(|state| state.interviews.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn outbox(&self) -> Vec<OutboxEntry> {
        self.lock()
            .map(|state| state.outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryStore {
    async fn insert(
        &self,
        record: ApplicationRecord,
        event: OutboxMessage,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut state = self.lock()?;
        if state.applications.iter().any(|existing| existing.id == record.id) {
            return Err(StoreError::Conflict);
        }
        state.applications.push(record.clone());
        state.outbox.push(OutboxEntry::pending(event, Utc::now()));
        Ok(record)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .applications
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .outbox
            .iter()
            .filter(|entry| entry.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<OutboxEntry>, StoreError> {
        let lease = lease_delta(lease)?;
        let now = Utc::now();
        let until = now
            .checked_add_signed(lease)
            .ok_or_else(|| StoreError::Unavailable("outbox lease overflows".to_string()))?;

        let mut state = self.lock()?;
        let mut claimed = Vec::new();
        for entry in state
            .outbox
            .iter_mut()
            .filter(|entry| entry.is_claimable(now, lease))
            .take(limit)
        {
            entry.claimed_until = Some(until);
            claimed.push(entry.clone());
        }
        Ok(claimed)
    }

    async fn mark_dispatched(&self, id: OutboxId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .outbox
            .iter_mut()
            .find(|entry| entry.message.id == id)
            .ok_or(StoreError::NotFound)?;
        if entry.dispatched_at.is_none() {
            entry.dispatched_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, error: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .outbox
            .iter_mut()
            .find(|entry| entry.message.id == id)
            .ok_or(StoreError::NotFound)?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        entry.claimed_until = None;
        Ok(())
    }
}

#[async_trait]
impl InterviewRepository for InMemoryStore {
    async fn upsert(&self, record: InterviewRecord) -> Result<Upserted, StoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.interviews.get(&record.application_id) {
            return Ok(Upserted::Existing(existing.clone()));
        }
        state
            .interviews
            .insert(record.application_id.clone(), record.clone());
        Ok(Upserted::Created(record))
    }

    async fn fetch(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<InterviewRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.interviews.get(application_id).cloned())
    }
}
