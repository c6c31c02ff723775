use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{JobId, ProgressState};

#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Records a transition. Regressions in percentage and moves out of a terminal
    /// phase are ignored; returns the state actually stored.
    async fn publish(&self, job_id: JobId, state: ProgressState) -> ProgressState;

    async fn get(&self, job_id: JobId) -> Option<ProgressState>;

    async fn evict_finished(&self, ttl: Duration) -> usize;
}
