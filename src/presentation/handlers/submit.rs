use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::domain::JobPayload;
use crate::presentation::handlers::error::{error_response, submission_error_response};
use crate::presentation::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub report_id: String,
}

#[tracing::instrument(skip(state, payload))]
pub async fn submit_handler(
    State(state): State<AppState>,
    payload: Result<Json<JobPayload>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected malformed submission");
            return error_response(rejection.status(), rejection.body_text());
        }
    };

    match state.submission_service.submit(payload).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                report_id: job_id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Submission rejected");
            submission_error_response(e)
        }
    }
}
