use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{Analyzer, AnalyzerError, AnnotationMode};
use crate::domain::{Article, ParsedArticle, StageName};
use crate::infrastructure::observability::sanitize_for_log;

pub struct HttpAnalyzer {
    client: Client,
    stage: StageName,
    endpoint: String,
}

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    stage: &'a str,
    mode: AnnotationMode,
    documents: Vec<AnnotateDocument<'a>>,
}

#[derive(Serialize)]
struct AnnotateDocument<'a> {
    #[serde(flatten)]
    article: &'a Article,
    parsed: &'a ParsedArticle,
}

impl HttpAnalyzer {
    pub fn new(
        stage: StageName,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalyzerError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            stage,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    #[tracing::instrument(skip(self, batch), fields(stage = %self.stage, documents = batch.len()))]
    async fn annotate(
        &self,
        batch: &[&Article],
        mode: AnnotationMode,
    ) -> Result<Vec<Value>, AnalyzerError> {
        let request_body = AnnotateRequest {
            stage: self.stage.as_str(),
            mode,
            documents: batch
                .iter()
                .map(|&article| AnnotateDocument {
                    article,
                    parsed: &article.parsed,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzerError::Timeout
                } else {
                    AnalyzerError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::RequestFailed(format!(
                "HTTP {}: {}",
                status,
                sanitize_for_log(&body)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnalyzerError::InvalidResponse(e.to_string()))?;

        let annotations = match body {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove("annotations") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(AnalyzerError::InvalidResponse(
                        "expected an `annotations` array".to_string(),
                    ));
                }
            },
            other => {
                return Err(AnalyzerError::InvalidResponse(format!(
                    "expected an array, got {}",
                    other
                )));
            }
        };

        if annotations.len() != batch.len() {
            return Err(AnalyzerError::BatchMisaligned {
                expected: batch.len(),
                actual: annotations.len(),
            });
        }

        Ok(annotations)
    }
}
