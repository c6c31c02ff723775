use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::infrastructure::observability::request_id_middleware;
use crate::presentation::auth::{ApiKeys, api_key_middleware};
use crate::presentation::handlers::{
    health_handler, job_result_handler, job_status_handler, stages_handler, submit_handler,
    upload_handler,
};
use crate::presentation::state::AppState;

pub const DEFAULT_BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub api_keys: ApiKeys,
    pub body_limit_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_keys: ApiKeys::default(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api = Router::new()
        .route("/api/v1/jobs", post(submit_handler))
        .route("/api/v1/jobs/files", post(upload_handler))
        .route("/api/v1/jobs/{job_id}/status", get(job_status_handler))
        .route("/api/v1/jobs/{job_id}/result", get(job_result_handler))
        .route("/api/v1/stages", get(stages_handler))
        .layer(middleware::from_fn_with_state(
            config.api_keys,
            api_key_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
