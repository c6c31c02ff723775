use async_trait::async_trait;
use serde_json::{Map, Value};

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, inputs: &[Map<String, Value>]) -> Result<Vec<Value>, SynthesisError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    RequestFailed(String),
    #[error("invalid synthesis response: {0}")]
    InvalidResponse(String),
}
