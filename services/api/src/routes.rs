use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;

/// Adds `/health`, `/ready` and `/metrics` to a service router.
pub(crate) fn with_operational_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(recorder.handle()),
        }
    }

    async fn get_status(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::get(uri).body(Body::empty()).expect("request builds"))
            .await
            .expect("route executes")
            .status()
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let state = state();
        let router = with_operational_routes(Router::new()).layer(Extension(state.clone()));

        assert_eq!(get_status(router.clone(), "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
        state.readiness.store(true, Ordering::Release);
        assert_eq!(get_status(router.clone(), "/ready").await, StatusCode::OK);
        assert_eq!(get_status(router, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_are_rendered_as_prometheus_text() {
        let router = with_operational_routes(Router::new()).layer(Extension(state()));

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request builds"))
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }
}
