use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use devlink::config::AppConfig;
use devlink::error::AppError;
use devlink::messaging::JetStreamQueue;
use devlink::storage::PostgresStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Durable backends shared by every stage of one process.
pub(crate) struct Backends {
    pub(crate) store: Arc<PostgresStore>,
    pub(crate) queue: Arc<JetStreamQueue>,
}

pub(crate) async fn connect_store(config: &AppConfig) -> Result<Arc<PostgresStore>, AppError> {
    let store =
        PostgresStore::connect(&config.store.database_url, config.pipeline.operation_timeout)
            .await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

pub(crate) async fn connect_queue(config: &AppConfig) -> Result<Arc<JetStreamQueue>, AppError> {
    let queue = JetStreamQueue::connect(&config.broker.url, config.broker.max_deliveries).await?;
    Ok(Arc::new(queue))
}

pub(crate) async fn connect_backends(config: &AppConfig) -> Result<Backends, AppError> {
    let store = connect_store(config).await?;
    let queue = connect_queue(config).await?;
    Ok(Backends { store, queue })
}

/// Process-wide stop signal fanned out to servers and loops.
#[derive(Clone)]
pub(crate) struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub(crate) fn on_ctrl_c() -> Self {
        let (sender, receiver) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown signal received");
                    let _ = sender.send(true);
                }
                Err(err) => {
                    warn!(error = %err, "unable to listen for shutdown signal");
                    // Keep the sender alive so waiters are not released.
                    std::future::pending::<()>().await;
                }
            }
        });
        Self { receiver }
    }

    #[cfg(test)]
    pub(crate) fn manual() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self { receiver })
    }

    pub(crate) async fn wait(mut self) {
        loop {
            let stopped = *self.receiver.borrow_and_update();
            if stopped || self.receiver.changed().await.is_err() {
                break;
            }
        }
    }
}
