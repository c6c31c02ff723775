use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::application::services::JobStatusView;
use crate::domain::{ProgressState, TaskState};
use crate::presentation::handlers::error::{parse_job_id, submission_error_response};
use crate::presentation::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ProgressMeta>,
}

#[derive(Debug, Serialize)]
pub struct ProgressMeta {
    pub phase: String,
    pub percentage: u8,
    pub label: String,
}

impl From<ProgressState> for ProgressMeta {
    fn from(state: ProgressState) -> Self {
        Self {
            phase: state.phase.to_string(),
            percentage: state.percentage,
            label: state.label,
        }
    }
}

impl From<JobStatusView> for JobStatusResponse {
    fn from(view: JobStatusView) -> Self {
        Self {
            job_id: view.job_id.to_string(),
            state: view.state,
            meta: view.progress.map(ProgressMeta::from),
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.submission_service.status(job_id).await {
        Ok(view) => (StatusCode::OK, Json(JobStatusResponse::from(view))).into_response(),
        Err(e) => submission_error_response(e),
    }
}
