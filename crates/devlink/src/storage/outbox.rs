use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutboxId(pub Uuid);

impl fmt::Display for OutboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Event waiting to be published, written alongside the record that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub id: OutboxId,
    pub queue: String,
    pub event_type: String,
    pub payload: Vec<u8>,
}

impl OutboxMessage {
    pub fn new(queue: &str, event_type: &str, payload: Vec<u8>) -> Self {
        Self {
            id: OutboxId(Uuid::new_v4()),
            queue: queue.to_string(),
            event_type: event_type.to_string(),
            payload,
        }
    }
}

/// Stored outbox row with its relay bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub message: OutboxMessage,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    /// A relay holding this entry until then; no other relay may claim it.
    pub claimed_until: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn pending(message: OutboxMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            message,
            created_at,
            attempts: 0,
            last_error: None,
            dispatched_at: None,
            claimed_until: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.dispatched_at.is_none()
    }

    /// Whether a relay may take this entry at `now`.
    ///
    /// A fresh entry belongs to the request that wrote it for one `lease`, so the relay
    /// never races its first publish. Entries that already failed are free at once.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        if !self.is_pending() {
            return false;
        }
        if self.claimed_until.is_some_and(|until| until > now) {
            return false;
        }
        self.attempts > 0
            || now
                .checked_sub_signed(lease)
                .is_some_and(|settled| self.created_at <= settled)
    }
}

/// Relay-facing view of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest undispatched entries first, claimed or not.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Claims up to `limit` claimable entries for `lease`, oldest first.
    ///
    /// Concurrent relays never receive the same entry while its lease runs.
    async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn mark_dispatched(&self, id: OutboxId) -> Result<(), StoreError>;

    /// Counts a failed publish and releases any claim on the entry.
    async fn record_failure(&self, id: OutboxId, error: &str) -> Result<(), StoreError>;
}

pub(crate) fn lease_delta(lease: Duration) -> Result<chrono::Duration, StoreError> {
    chrono::Duration::from_std(lease)
        .map_err(|_| StoreError::Unavailable(format!("outbox lease {lease:?} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(created_at: DateTime<Utc>) -> OutboxEntry {
        OutboxEntry::pending(OutboxMessage::new("q", "e", Vec::new()), created_at)
    }

    #[test]
    fn fresh_entries_wait_out_the_lease() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let lease = chrono::Duration::seconds(15);
        let fresh = entry(created);

        assert!(!fresh.is_claimable(created + chrono::Duration::seconds(5), lease));
        assert!(fresh.is_claimable(created + lease, lease));
    }

    #[test]
    fn failed_entries_are_claimable_until_someone_holds_them() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let lease = chrono::Duration::seconds(15);
        let mut failed = entry(created);
        failed.attempts = 1;
        assert!(failed.is_claimable(created, lease));

        failed.claimed_until = Some(created + lease);
        assert!(!failed.is_claimable(created + chrono::Duration::seconds(1), lease));
        assert!(failed.is_claimable(created + lease, lease));

        failed.dispatched_at = Some(created);
        assert!(!failed.is_claimable(created + lease, lease));
    }
}
