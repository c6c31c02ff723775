use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::ports::ProgressTracker;
use crate::domain::{JobId, Phase, ProgressState};

struct Entry {
    state: ProgressState,
    updated_at: Instant,
}

#[derive(Default)]
pub struct InMemoryProgressTracker {
    entries: RwLock<HashMap<JobId, Entry>>,
}

impl InMemoryProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ProgressTracker for InMemoryProgressTracker {
    async fn publish(&self, job_id: JobId, state: ProgressState) -> ProgressState {
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get_mut(&job_id) else {
            tracing::debug!(job_id = %job_id, phase = %state.phase, percentage = state.percentage, "Progress");
            entries.insert(
                job_id,
                Entry {
                    state: state.clone(),
                    updated_at: Instant::now(),
                },
            );
            return state;
        };

        if entry.state.phase.is_terminal() {
            tracing::debug!(
                job_id = %job_id,
                current = %entry.state.phase,
                rejected = %state.phase,
                "Ignoring transition out of terminal phase"
            );
            return entry.state.clone();
        }

        let next = if state.phase == Phase::Failed {
            ProgressState {
                percentage: state.percentage.max(entry.state.percentage),
                ..state
            }
        } else if state.percentage < entry.state.percentage {
            tracing::debug!(
                job_id = %job_id,
                current = entry.state.percentage,
                rejected = state.percentage,
                "Ignoring progress regression"
            );
            return entry.state.clone();
        } else {
            state
        };

        tracing::debug!(job_id = %job_id, phase = %next.phase, percentage = next.percentage, "Progress");
        entry.state = next.clone();
        entry.updated_at = Instant::now();
        next
    }

    async fn get(&self, job_id: JobId) -> Option<ProgressState> {
        self.entries
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.state.clone())
    }

    async fn evict_finished(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            !(entry.state.phase.is_terminal() && entry.updated_at.elapsed() >= ttl)
        });
        before - entries.len()
    }
}
