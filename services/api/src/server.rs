use crate::cli::ServeArgs;
use crate::infra::{connect_backends, AppState, Shutdown};
use crate::routes::with_operational_routes;
use axum::{Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use devlink::config::{AppConfig, ServerConfig};
use devlink::error::AppError;
use devlink::gateway::{gateway_router, Gateway};
use devlink::telemetry;
use devlink::workflows::applications::{
    application_router, ApplicationService, OutboxRelay, RelaySettings,
};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

fn apply_overrides(server: &mut ServerConfig, mut args: ServeArgs) {
    if let Some(host) = args.host.take() {
        server.host = host;
    }
    if let Some(port) = args.port.take() {
        server.port = port;
    }
}

pub(crate) async fn run_gateway(args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    apply_overrides(&mut config.gateway.server, args);
    telemetry::init(&config.telemetry)?;

    let gateway = Gateway::from_config(&config.gateway)?;
    for route in gateway.routes().routes() {
        info!(prefix = route.prefix(), upstream = route.upstream(), "route registered");
    }

    let app = with_operational_routes(Router::new()).merge(gateway_router(gateway));
    serve(app, &config.gateway.server, "edge router", Shutdown::on_ctrl_c()).await
}

pub(crate) async fn run_applications(args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    apply_overrides(&mut config.applications, args);
    telemetry::init(&config.telemetry)?;

    let backends = connect_backends(&config).await?;
    let shutdown = Shutdown::on_ctrl_c();

    let service = ApplicationService::new(backends.store.clone(), backends.queue.clone())
        .with_operation_timeout(config.pipeline.operation_timeout);
    service.prepare().await?;

    let relay = OutboxRelay::new(
        backends.store.clone(),
        backends.queue.clone(),
        RelaySettings {
            poll_interval: config.pipeline.outbox_poll_interval,
            batch_size: config.pipeline.outbox_batch_size,
            operation_timeout: config.pipeline.operation_timeout,
            claim_lease: RelaySettings::lease_for(config.pipeline.operation_timeout),
        },
    );

    let app = with_operational_routes(application_router(Arc::new(service)));
    let serving = serve(app, &config.applications, "application service", shutdown.clone());
    serve_with_background(serving, shutdown, |stop| relay.run(stop)).await
}

/// Runs `serving` with a background task that stops on `shutdown` or as soon as
/// `serving` returns, whichever comes first.
async fn serve_with_background<S, B, F>(
    serving: S,
    shutdown: Shutdown,
    background: B,
) -> Result<(), AppError>
where
    S: Future<Output = Result<(), AppError>>,
    B: FnOnce(BoxFuture<'static, ()>) -> F,
    F: Future<Output = ()> + Send + 'static,
{
    let (stop, stopped) = oneshot::channel::<()>();
    let signal = async move {
        tokio::select! {
            _ = shutdown.wait() => {}
            _ = stopped => {}
        }
    };
    let task = tokio::spawn(background(Box::pin(signal)));

    let served = serving.await;
    let _ = stop.send(());
    if let Err(err) = task.await {
        warn!(error = %err, "background task ended abnormally");
    }
    served
}

async fn serve(
    app: Router,
    server: &ServerConfig,
    role: &'static str,
    shutdown: Shutdown,
) -> Result<(), AppError> {
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = app.layer(Extension(app_state)).layer(prometheus_layer);

    let addr = server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(%addr, role, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await?;
    info!(role, "stopped");
    Ok(())
}
