//! Record store contracts and adapters.
//!
//! The workflows only see the repository traits; [`InMemoryStore`] backs tests and the
//! demo, [`PostgresStore`] backs deployed services.

pub mod memory;
pub mod outbox;
pub mod postgres;

use std::time::Duration;

pub use memory::InMemoryStore;
pub use outbox::{OutboxEntry, OutboxId, OutboxMessage, OutboxStore};
pub use postgres::PostgresStore;

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation `{operation}` timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
    #[error("stored data could not be decoded: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn timed_out(operation: &'static str, limit: Duration) -> Self {
        Self::Timeout { operation, limit }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Corrupt(value.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::Conflict,
            other => Self::Unavailable(other.to_string()),
        }
    }
}
