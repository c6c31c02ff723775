use std::sync::Arc;

use serde_json::{Map, Value};

use crate::application::ports::Synthesizer;
use crate::domain::{Article, StageName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisPlan {
    pub source_stage: StageName,
    pub span_fields: Vec<String>,
    pub article_fields: Vec<String>,
    pub target: StageName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Derived,
    MissingInput { field: String },
    Failed { reason: String },
    Skipped,
}

pub struct SynthesisStep {
    plan: SynthesisPlan,
    engine: Arc<dyn Synthesizer>,
}

impl SynthesisStep {
    pub fn new(plan: SynthesisPlan, engine: Arc<dyn Synthesizer>) -> Self {
        Self { plan, engine }
    }

    pub fn plan(&self) -> &SynthesisPlan {
        &self.plan
    }

    pub fn applies_to(&self, executed: &[StageName]) -> bool {
        executed.contains(&self.plan.source_stage)
    }

    pub fn package(&self, article: &Article) -> Result<Map<String, Value>, String> {
        let mut input = Map::new();

        for field in &self.plan.article_fields {
            match article.field(field) {
                Some(value) if !is_blank(&value) => {
                    input.insert(field.clone(), value);
                }
                _ => return Err(field.clone()),
            }
        }

        let source = article.annotation(self.plan.source_stage.as_str());
        for field in &self.plan.span_fields {
            match source.and_then(|annotation| annotation.get(field)) {
                Some(value) if !is_blank(value) => {
                    input.insert(field.clone(), value.clone());
                }
                _ => return Err(format!("{}.{}", self.plan.source_stage, field)),
            }
        }

        Ok(input)
    }

    /// Never fails the pipeline: problems are reported per document.
    pub async fn run(&self, articles: &mut [Article]) -> Vec<SynthesisOutcome> {
        let mut outcomes = Vec::with_capacity(articles.len());
        let mut ready: Vec<usize> = Vec::new();
        let mut inputs: Vec<Map<String, Value>> = Vec::new();

        for (index, article) in articles.iter().enumerate() {
            if article.is_skipped() {
                outcomes.push(SynthesisOutcome::Skipped);
                continue;
            }
            match self.package(article) {
                Ok(input) => {
                    outcomes.push(SynthesisOutcome::Derived);
                    ready.push(index);
                    inputs.push(input);
                }
                Err(field) => {
                    tracing::info!(
                        document_index = index,
                        field = %field,
                        "Synthesis input missing, document left without derived field"
                    );
                    outcomes.push(SynthesisOutcome::MissingInput { field });
                }
            }
        }

        if ready.is_empty() {
            return outcomes;
        }

        let derived = match self.engine.synthesize(&inputs).await {
            Ok(values) if values.len() == ready.len() => values,
            Ok(values) => {
                let reason = format!(
                    "engine returned {} results for {} inputs",
                    values.len(),
                    ready.len()
                );
                tracing::warn!(reason = %reason, "Synthesis output misaligned, discarding");
                return fail_ready(outcomes, &ready, reason);
            }
            Err(e) => {
                tracing::warn!(error = %e, documents = ready.len(), "Synthesis engine failed");
                return fail_ready(outcomes, &ready, e.to_string());
            }
        };

        for (index, value) in ready.into_iter().zip(derived) {
            articles[index].annotate(&self.plan.target, value);
        }

        outcomes
    }
}

fn fail_ready(
    mut outcomes: Vec<SynthesisOutcome>,
    ready: &[usize],
    reason: String,
) -> Vec<SynthesisOutcome> {
    for &index in ready {
        outcomes[index] = SynthesisOutcome::Failed {
            reason: reason.clone(),
        };
    }
    outcomes
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
