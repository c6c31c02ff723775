use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::presentation::state::AppState;

#[derive(Debug, Serialize)]
pub struct StageInfo {
    pub name: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub filter: bool,
}

pub async fn stages_handler(State(state): State<AppState>) -> impl IntoResponse {
    let filter = state.registry.filter_stage().map(|stage| stage.name.clone());

    let stages: Vec<StageInfo> = state
        .registry
        .stage_names()
        .into_iter()
        .filter_map(|name| state.registry.get(name.as_str()))
        .map(|stage| StageInfo {
            name: stage.name.to_string(),
            description: stage.description.clone(),
            depends_on: stage.depends_on.iter().map(ToString::to_string).collect(),
            filter: filter.as_ref() == Some(&stage.name),
        })
        .collect();

    Json(stages)
}
