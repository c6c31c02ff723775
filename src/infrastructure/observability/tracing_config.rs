#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub environment: String,
    pub json_format: bool,
    pub default_filter: String,
}

pub const DEFAULT_FILTER: &str = "info,assessor=debug,tower_http=debug,sqlx=warn";

impl TracingConfig {
    pub fn new(environment: impl Into<String>, json_format: bool, default_filter: Option<String>) -> Self {
        Self {
            environment: environment.into(),
            json_format,
            default_filter: default_filter.unwrap_or_else(|| DEFAULT_FILTER.to_string()),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            environment: std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "local".to_string()),
            json_format: std::env::var("LOG_FORMAT")
                .map(|v| v.to_lowercase() == "json")
                .unwrap_or(false),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}
