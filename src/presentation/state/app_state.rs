use std::sync::Arc;

use crate::application::services::{AnalyzerRegistry, SubmissionService};

pub struct AppState {
    pub submission_service: Arc<SubmissionService>,
    pub registry: Arc<AnalyzerRegistry>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            submission_service: Arc::clone(&self.submission_service),
            registry: Arc::clone(&self.registry),
        }
    }
}
