use assessor::application::services::RegistryError;
use assessor::infrastructure::analyzers::{RegistryFactory, RegistryFactoryError};
use assessor::presentation::config::{AnalyzerSettings, SynthesisSettings};

use crate::helpers::stage;

fn analyzer_settings(name: &str, depends_on: &[&str]) -> AnalyzerSettings {
    AnalyzerSettings {
        name: stage(name),
        description: None,
        endpoint: format!("http://localhost:9000/{}", name),
        depends_on: depends_on.iter().map(|d| stage(d)).collect(),
        timeout_secs: 30,
    }
}

#[test]
fn given_configured_analyzers_when_creating_registry_then_all_stages_are_registered() {
    let settings = vec![
        analyzer_settings("rct", &[]),
        analyzer_settings("pico", &[]),
        analyzer_settings("bias", &["pico"]),
    ];

    let registry = RegistryFactory::create(&settings, Some(&stage("rct"))).unwrap();

    assert!(registry.contains("bias"));
    assert_eq!(registry.description("pico"), Some("running pico"));
    assert_eq!(
        registry.filter_stage().map(|s| s.name.as_str()),
        Some("rct")
    );
}

#[test]
fn given_unknown_filter_stage_when_creating_registry_then_rejects() {
    let settings = vec![analyzer_settings("pico", &[])];

    let result = RegistryFactory::create(&settings, Some(&stage("rct")));

    assert!(matches!(
        result,
        Err(RegistryFactoryError::Registry(RegistryError::UnknownStage(_)))
    ));
}

#[test]
fn given_synthesis_source_not_registered_when_creating_synthesis_then_rejects() {
    let registry = RegistryFactory::create(&[analyzer_settings("pico", &[])], None).unwrap();
    let synthesis = SynthesisSettings {
        endpoint: "http://localhost:9000/synthesize".to_string(),
        source_stage: stage("sample_size"),
        span_fields: vec!["population".to_string()],
        article_fields: vec![],
        target_key: stage("summary"),
        timeout_secs: 30,
    };

    let result = RegistryFactory::create_synthesis(&synthesis, &registry);

    assert!(matches!(
        result,
        Err(RegistryFactoryError::UnknownSynthesisSource(name)) if name == "sample_size"
    ));
}

#[test]
fn given_valid_synthesis_settings_when_creating_then_plan_reflects_configuration() {
    let registry = RegistryFactory::create(&[analyzer_settings("pico", &[])], None).unwrap();
    let synthesis = SynthesisSettings {
        endpoint: "http://localhost:9000/synthesize".to_string(),
        source_stage: stage("pico"),
        span_fields: vec!["population".to_string()],
        article_fields: vec!["ti".to_string()],
        target_key: stage("summary"),
        timeout_secs: 30,
    };

    let step = RegistryFactory::create_synthesis(&synthesis, &registry).unwrap();

    assert_eq!(step.plan().source_stage, stage("pico"));
    assert_eq!(step.plan().target, stage("summary"));
    assert!(step.applies_to(&[stage("pico")]));
}
