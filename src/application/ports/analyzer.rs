use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::domain::Article;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationMode {
    TextBatch,
    FullDocument,
}

/// Must return exactly one annotation per input article, in input order.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn annotate(
        &self,
        batch: &[&Article],
        mode: AnnotationMode,
    ) -> Result<Vec<Value>, AnalyzerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer request failed: {0}")]
    RequestFailed(String),
    #[error("invalid analyzer response: {0}")]
    InvalidResponse(String),
    #[error("analyzer returned {actual} results for {expected} documents")]
    BatchMisaligned { expected: usize, actual: usize },
    #[error("analyzer timed out")]
    Timeout,
}
