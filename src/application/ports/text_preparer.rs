use async_trait::async_trait;

use crate::domain::ParsedText;

/// Batch tokenizer/parser. Output order must match input order one-to-one.
#[async_trait]
pub trait TextPreparer: Send + Sync {
    async fn prepare_batch(&self, texts: Vec<String>) -> Result<Vec<ParsedText>, TextPreparerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TextPreparerError {
    #[error("text preparation failed: {0}")]
    Failed(String),
    #[error("text preparer returned {actual} results for {expected} texts")]
    BatchMisaligned { expected: usize, actual: usize },
}
