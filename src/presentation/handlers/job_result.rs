use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::presentation::handlers::error::{parse_job_id, submission_error_response};
use crate::presentation::state::AppState;

#[tracing::instrument(skip(state))]
pub async fn job_result_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.submission_service.result(job_id).await {
        Ok(articles) => (StatusCode::OK, Json(articles)).into_response(),
        Err(e) => submission_error_response(e),
    }
}
