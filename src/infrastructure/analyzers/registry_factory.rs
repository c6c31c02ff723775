use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{AnalyzerError, SynthesisError};
use crate::application::services::{
    AnalyzerRegistry, RegistryError, StageRegistration, SynthesisPlan, SynthesisStep,
};
use crate::domain::StageName;
use crate::presentation::config::{AnalyzerSettings, SynthesisSettings};

use super::http_analyzer::HttpAnalyzer;
use super::http_synthesizer::HttpSynthesizer;

#[derive(Debug, thiserror::Error)]
pub enum RegistryFactoryError {
    #[error("analyzer {stage}: {source}")]
    Analyzer {
        stage: String,
        #[source]
        source: AnalyzerError,
    },
    #[error("synthesis engine: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("synthesis source stage {0} is not registered")]
    UnknownSynthesisSource(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct RegistryFactory;

impl RegistryFactory {
    pub fn create(
        analyzers: &[AnalyzerSettings],
        filter_stage: Option<&StageName>,
    ) -> Result<AnalyzerRegistry, RegistryFactoryError> {
        let mut builder = AnalyzerRegistry::builder();

        for settings in analyzers {
            let analyzer = HttpAnalyzer::new(
                settings.name.clone(),
                settings.endpoint.clone(),
                Duration::from_secs(settings.timeout_secs),
            )
            .map_err(|source| RegistryFactoryError::Analyzer {
                stage: settings.name.to_string(),
                source,
            })?;

            tracing::info!(stage = %settings.name, endpoint = %settings.endpoint, "Registering analyzer");
            builder = builder.register(
                StageRegistration::new(settings.name.clone(), settings.description(), Arc::new(analyzer))
                    .depends_on(settings.depends_on.iter().cloned()),
            );
        }

        if let Some(filter) = filter_stage {
            builder = builder.filter_stage(filter.clone());
        }

        Ok(builder.build()?)
    }

    pub fn create_synthesis(
        settings: &SynthesisSettings,
        registry: &AnalyzerRegistry,
    ) -> Result<SynthesisStep, RegistryFactoryError> {
        if !registry.contains(settings.source_stage.as_str()) {
            return Err(RegistryFactoryError::UnknownSynthesisSource(
                settings.source_stage.to_string(),
            ));
        }

        let engine = HttpSynthesizer::new(
            settings.endpoint.clone(),
            Duration::from_secs(settings.timeout_secs),
        )?;

        let plan = SynthesisPlan {
            source_stage: settings.source_stage.clone(),
            span_fields: settings.span_fields.clone(),
            article_fields: settings.article_fields.clone(),
            target: settings.target_key.clone(),
        };

        Ok(SynthesisStep::new(plan, Arc::new(engine)))
    }
}
