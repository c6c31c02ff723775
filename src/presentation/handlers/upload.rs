use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::{ContentType, PendingFile, StageName};
use crate::presentation::handlers::error::{error_response, submission_error_response};
use crate::presentation::handlers::submit::SubmitResponse;
use crate::presentation::state::AppState;

const STAGES_FIELD: &str = "stages";

#[tracing::instrument(skip(state, multipart))]
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut files: Vec<PendingFile> = Vec::new();
    let mut stages: Option<Vec<StageName>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read multipart");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read multipart: {}", e),
                );
            }
        };

        if field.name() == Some(STAGES_FIELD) && field.file_name().is_none() {
            let raw = match field.text().await {
                Ok(t) => t,
                Err(e) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read stages: {}", e),
                    );
                }
            };
            match parse_stages(&raw) {
                Ok(parsed) => stages = Some(parsed),
                Err(response) => return response,
            }
            continue;
        }

        let filename = field.file_name().unwrap_or("unknown").to_string();
        let declared = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let Some(content_type) = resolve_content_type(&declared, &filename) else {
            tracing::warn!(content_type = %declared, filename = %filename, "Unsupported content type");
            return error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("Unsupported content type: {}", declared),
            );
        };

        let data = match field.bytes().await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read file bytes");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read file: {}", e),
                );
            }
        };

        tracing::debug!(filename = %filename, bytes = data.len(), "File part received");
        files.push(PendingFile::new(filename, content_type, data.to_vec()));
    }

    if files.is_empty() {
        tracing::warn!("Upload request with no file");
        return error_response(StatusCode::BAD_REQUEST, "No file uploaded");
    }

    match state.submission_service.submit_files(files, stages).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                report_id: job_id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "File submission rejected");
            submission_error_response(e)
        }
    }
}

fn parse_stages(raw: &str) -> Result<Vec<StageName>, Response> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| {
            error_response(StatusCode::BAD_REQUEST, format!("Invalid stages: {}", e))
        });
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            StageName::new(s).map_err(|e| {
                error_response(StatusCode::BAD_REQUEST, format!("Invalid stages: {}", e))
            })
        })
        .collect()
}

fn resolve_content_type(declared: &str, filename: &str) -> Option<ContentType> {
    let mime = declared.split(';').next().unwrap_or_default().trim();
    ContentType::from_mime(mime).or_else(|| {
        let extension = filename.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(ContentType::Pdf),
            "txt" => Some(ContentType::Text),
            _ => None,
        }
    })
}
