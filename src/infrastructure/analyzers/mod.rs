mod http_analyzer;
mod http_synthesizer;
mod registry_factory;

pub use http_analyzer::HttpAnalyzer;
pub use http_synthesizer::HttpSynthesizer;
pub use registry_factory::{RegistryFactory, RegistryFactoryError};
