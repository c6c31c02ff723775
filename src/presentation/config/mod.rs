mod environment;
mod settings;

pub use environment::{ENVIRONMENT_VAR, Environment};
pub use settings::{
    AnalyzerSettings, AuthSettings, CONFIG_ENV_PREFIX, DatabaseSettings, LoggingSettings,
    PipelineSettings, ServerSettings, Settings, StoreProvider, SynthesisSettings, WorkerSettings,
};
