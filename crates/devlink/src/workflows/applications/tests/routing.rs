use super::common::*;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::messaging::{InMemoryQueue, INTERVIEW_QUEUE};
use crate::storage::InMemoryStore;
use crate::workflows::applications::router::{list_handler, ListParams};
use crate::workflows::applications::{application_router, ApplicationService};

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn apply_route_returns_created_record() {
    let (router, store, queue) = router_with_memory_backends().await;

    let response = router
        .oneshot(post_json(
            "/apply",
            json!({ "user_id": "u1", "job_id": "j1", "cover_note": "hi" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["user_id"], "u1");
    assert_eq!(payload["job_id"], "j1");
    assert_eq!(payload["cover_note"], "hi");
    assert!(payload["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(store.applications().len(), 1);
    assert_eq!(queue.published(INTERVIEW_QUEUE).len(), 1);
}

#[tokio::test]
async fn apply_route_accepts_camel_case_and_trailing_slash() {
    let (router, _, _) = router_with_memory_backends().await;

    let response = router
        .oneshot(post_json(
            "/apply/",
            json!({ "userId": "u1", "jobId": "j1", "id": "client-chosen" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_ne!(payload["id"], "client-chosen");
    assert_eq!(payload["cover_note"], "");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (router, store, _) = router_with_memory_backends().await;

    let response = router
        .oneshot(
            Request::post("/apply")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.applications().is_empty());
}

#[tokio::test]
async fn missing_job_id_is_a_bad_request() {
    let (router, _, queue) = router_with_memory_backends().await;

    let response = router
        .oneshot(post_json("/apply", json!({ "user_id": "u1" })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert!(payload["error"].as_str().is_some_and(|error| error.contains("job_id")));
    assert!(queue.published(INTERVIEW_QUEUE).is_empty());
}

#[tokio::test]
async fn store_outage_is_reported_as_storage_failure() {
    let queue = Arc::new(InMemoryQueue::new());
    let service = ApplicationService::new(Arc::new(UnavailableStore), queue);
    service.prepare().await.expect("declare");
    let router = application_router(Arc::new(service));

    let response = router
        .oneshot(post_json("/apply", json!({ "user_id": "u1", "job_id": "j1" })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "storage_failure");
}

#[tokio::test]
async fn queue_outage_is_reported_with_the_stored_id() {
    let store = Arc::new(InMemoryStore::new());
    let service = ApplicationService::new(store.clone(), Arc::new(RejectingQueue::default()));
    service.prepare().await.expect("declare");
    let router = application_router(Arc::new(service));

    let response = router
        .oneshot(post_json("/apply", json!({ "user_id": "u1", "job_id": "j1" })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "dispatch_failure");
    let stored = store.applications();
    assert_eq!(payload["application_id"], stored[0].id.as_str());
}

#[tokio::test]
async fn list_routes_return_user_applications() {
    let (service, _, _) = build_service().await;
    let service = Arc::new(service);
    service.submit(submission()).await.expect("submit");
    let router = application_router(service.clone());

    for uri in ["/list?user_id=u1", "/apply/list?user_id=u1"] {
        let response = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).expect("request builds"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json_body(response).await;
        assert_eq!(payload.as_array().map(Vec::len), Some(1));
        assert_eq!(payload[0]["job_id"], "j1");
    }
}

#[tokio::test]
async fn list_handler_requires_a_user() {
    let (service, _, _) = build_service().await;

    let response = list_handler::<InMemoryStore, InMemoryQueue>(
        State(Arc::new(service)),
        Query(ListParams::default()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
