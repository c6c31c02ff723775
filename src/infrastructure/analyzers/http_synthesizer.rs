use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::ports::{SynthesisError, Synthesizer};
use crate::infrastructure::observability::sanitize_for_log;

pub struct HttpSynthesizer {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    inputs: &'a [Map<String, Value>],
}

#[derive(Deserialize)]
struct SynthesisResponse {
    results: Vec<Value>,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SynthesisError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    #[tracing::instrument(skip(self, inputs), fields(inputs = inputs.len()))]
    async fn synthesize(&self, inputs: &[Map<String, Value>]) -> Result<Vec<Value>, SynthesisError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SynthesisRequest { inputs })
            .send()
            .await
            .map_err(|e| SynthesisError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::RequestFailed(format!(
                "HTTP {}: {}",
                status,
                sanitize_for_log(&body)
            )));
        }

        let synthesis: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(e.to_string()))?;

        Ok(synthesis.results)
    }
}
