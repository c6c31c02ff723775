use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::presentation::handlers::ErrorResponse;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Default)]
pub struct ApiKeys(Arc<HashSet<String>>);

impl ApiKeys {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self(Arc::new(
            keys.into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        ))
    }

    pub fn is_enabled(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

pub async fn api_key_middleware(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Response {
    if !keys.is_enabled() {
        return next.run(request).await;
    }

    let verdict = {
        let headers = request.headers();
        let presented = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .or_else(|| {
                headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
            })
            .map(str::trim);

        match presented {
            Some(key) if keys.accepts(key) => Ok(()),
            Some(_) => Err("Invalid API key"),
            None => Err("Missing API key"),
        }
    };

    match verdict {
        Ok(()) => next.run(request).await,
        Err(message) => {
            tracing::warn!(reason = message, "Rejected unauthenticated request");
            unauthorized(message)
        }
    }
}

fn unauthorized(message: &str) -> Response {
    let body = ErrorResponse {
        error: message.to_string(),
        report_id: None,
    };
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
