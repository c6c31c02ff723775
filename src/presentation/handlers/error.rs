use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::application::services::SubmissionError;
use crate::domain::JobId;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            report_id: None,
        }),
    )
        .into_response()
}

pub fn submission_error_response(error: SubmissionError) -> Response {
    match error {
        SubmissionError::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
        SubmissionError::Plan(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        SubmissionError::NotFound(job_id) => {
            error_response(StatusCode::NOT_FOUND, format!("Job not found: {}", job_id))
        }
        SubmissionError::Dispatch { job_id, source } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: format!("Job queued but not dispatched: {}", source),
                report_id: Some(job_id.to_string()),
            }),
        )
            .into_response(),
        SubmissionError::Store(e) => {
            tracing::error!(error = %e, "Job store failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Job store unavailable")
        }
    }
}

pub fn parse_job_id(raw: &str) -> Result<JobId, Response> {
    Uuid::parse_str(raw)
        .map(JobId::from_uuid)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, format!("Invalid job ID: {}", raw)))
}
