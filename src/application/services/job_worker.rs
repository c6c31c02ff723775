use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::application::ports::TaskSubscription;

use super::pipeline_executor::{ExecutionOutcome, PipelineExecutor};

pub struct JobWorker {
    id: String,
    subscription: TaskSubscription,
    executor: Arc<PipelineExecutor>,
}

impl JobWorker {
    pub fn new(
        id: impl Into<String>,
        subscription: TaskSubscription,
        executor: Arc<PipelineExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            subscription,
            executor,
        }
    }

    pub async fn run(self) {
        tracing::info!(worker_id = %self.id, kind = %self.subscription.kind(), "Job worker started");

        while let Some(task) = self.subscription.recv().await {
            let span = tracing::info_span!(
                "annotation_job",
                job_id = %task.job_id,
                kind = %task.kind,
                worker_id = %self.id,
            );

            async {
                match self.executor.execute(task.job_id, &self.id).await {
                    Ok(ExecutionOutcome::Completed { documents, .. }) => {
                        tracing::debug!(documents, "Task finished");
                    }
                    Ok(outcome) => {
                        tracing::debug!(outcome = ?outcome, "Task dropped");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Annotation job failed");
                    }
                }
            }
            .instrument(span)
            .await;
        }

        tracing::info!(worker_id = %self.id, "Job worker stopped: broker closed");
    }
}

pub fn spawn_worker_pool(
    name: &str,
    size: usize,
    subscription: TaskSubscription,
    executor: Arc<PipelineExecutor>,
) -> Vec<JoinHandle<()>> {
    (0..size.max(1))
        .map(|n| {
            let worker = JobWorker::new(
                format!("{}-{}-{}", name, subscription.kind(), n),
                subscription.clone(),
                Arc::clone(&executor),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}
