use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stages: usize,
    pub filter_stage: Option<String>,
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stages = state.registry.stage_names().len();
    let status = if stages == 0 { "degraded" } else { "healthy" };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            stages,
            filter_stage: state
                .registry
                .filter_stage()
                .map(|stage| stage.name.to_string()),
        }),
    )
}
