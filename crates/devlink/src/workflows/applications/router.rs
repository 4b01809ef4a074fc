use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationSubmission, SubmissionError};
use super::repository::ApplicationRepository;
use super::service::{ApplicationService, ApplicationServiceError};
use crate::messaging::MessageQueue;
use crate::storage::OutboxStore;

/// Router exposing intake and listing. The `/apply/...` aliases keep both endpoints
/// reachable through the edge router's `/apply` prefix.
pub fn application_router<R, Q>(service: Arc<ApplicationService<R, Q>>) -> Router
where
    R: ApplicationRepository + OutboxStore + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    Router::new()
        .route("/apply", post(submit_handler::<R, Q>))
        .route("/apply/", post(submit_handler::<R, Q>))
        .route("/list", get(list_handler::<R, Q>))
        .route("/apply/list", get(list_handler::<R, Q>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
}

pub(crate) async fn submit_handler<R, Q>(
    State(service): State<Arc<ApplicationService<R, Q>>>,
    payload: Result<Json<ApplicationSubmission>, JsonRejection>,
) -> Response
where
    R: ApplicationRepository + OutboxStore + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            let error = SubmissionError::Malformed(rejection.body_text());
            return error_response(ApplicationServiceError::Invalid(error));
        }
    };

    match service.submit(submission).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, Q>(
    State(service): State<Arc<ApplicationService<R, Q>>>,
    Query(params): Query<ListParams>,
) -> Response
where
    R: ApplicationRepository + OutboxStore + 'static,
    Q: MessageQueue + ?Sized + 'static,
{
    let user_id = params.user_id.unwrap_or_default();
    match service.list(&user_id).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(error: ApplicationServiceError) -> Response {
    match &error {
        ApplicationServiceError::Invalid(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        ApplicationServiceError::Storage(_) | ApplicationServiceError::Encode(_) => {
            let payload = json!({
                "error": error.to_string(),
                "code": "storage_failure",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
        ApplicationServiceError::Dispatch { application_id, .. } => {
            let payload = json!({
                "error": error.to_string(),
                "code": "dispatch_failure",
                "application_id": application_id,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
