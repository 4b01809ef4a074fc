use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::deadline::bounded;
use crate::messaging::{MessageQueue, QueueError};
use crate::storage::{OutboxStore, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub operation_timeout: Duration,
    /// How long a writer or relay owns an entry before another relay may take it.
    /// Must cover a publish plus the dispatch mark.
    pub claim_lease: Duration,
}

impl RelaySettings {
    /// Lease long enough for a request's publish and mark, each bounded by `operation_timeout`.
    pub fn lease_for(operation_timeout: Duration) -> Duration {
        operation_timeout.saturating_mul(3)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        let operation_timeout = Duration::from_secs(5);
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 50,
            operation_timeout,
            claim_lease: Self::lease_for(operation_timeout),
        }
    }
}

/// Counts from a single relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub dispatched: usize,
    pub failed: usize,
}

/// Background publisher for outbox entries the request path could not deliver.
///
/// All progress lives in the store, so a restarted relay resumes where the previous one
/// stopped. An entry may be published twice if a crash lands between publish and mark.
pub struct OutboxRelay<S, Q: ?Sized> {
    store: Arc<S>,
    queue: Arc<Q>,
    settings: RelaySettings,
}

impl<S, Q> OutboxRelay<S, Q>
where
    S: OutboxStore + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>, settings: RelaySettings) -> Self {
        Self {
            store,
            queue,
            settings,
        }
    }

    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "outbox relay started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    match self.relay_once().await {
                        Ok(report) if report.dispatched + report.failed > 0 => {
                            info!(dispatched = report.dispatched, failed = report.failed, "outbox relay pass");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "outbox relay pass failed"),
                    }
                }
            }
        }

        info!("outbox relay stopped");
    }

    /// Claims and publishes one batch of entries.
    ///
    /// Entries a request is still publishing, and entries another relay holds, are skipped.
    pub async fn relay_once(&self) -> Result<RelayReport, StoreError> {
        let limit = self.settings.operation_timeout;
        let claimed = bounded(
            limit,
            self.store.claim(self.settings.batch_size, self.settings.claim_lease),
            || StoreError::timed_out("claim_outbox", limit),
        )
        .await?;

        let mut report = RelayReport::default();
        for entry in claimed {
            let id = entry.message.id;
            let published = bounded(
                limit,
                self.queue.publish(&entry.message.queue, entry.message.payload.clone()),
                || QueueError::timed_out("publish", limit),
            )
            .await;

            match published {
                Ok(()) => {
                    bounded(limit, self.store.mark_dispatched(id), || {
                        StoreError::timed_out("mark_dispatched", limit)
                    })
                    .await?;
                    debug!(outbox_id = %id, queue = %entry.message.queue, "outbox entry dispatched");
                    report.dispatched += 1;
                }
                Err(err) => {
                    warn!(
                        outbox_id = %id,
                        attempts = entry.attempts + 1,
                        error = %err,
                        "outbox entry publish failed"
                    );
                    bounded(limit, self.store.record_failure(id, &err.to_string()), || {
                        StoreError::timed_out("record_outbox_failure", limit)
                    })
                    .await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
