use std::sync::Arc;

use chrono::Utc;

use crate::application::ports::{
    BrokerError, JobStore, JobStoreError, ProgressTracker, Task, TaskBroker, TaskKind,
};
use crate::domain::{
    Article, FileJobOptions, FilterPolicy, JobId, JobPayload, PendingFile, PendingJob,
    PendingStatus, Phase, ProgressState, StageName, TaskState,
};

use super::analyzer_registry::{AnalyzerRegistry, RegistryError};

#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    pub default_filter_policy: FilterPolicy,
    pub file_stages: Vec<StageName>,
    pub archive_dont_delete: bool,
    pub max_documents: usize,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            default_filter_policy: FilterPolicy::None,
            file_stages: Vec::new(),
            archive_dont_delete: true,
            max_documents: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub state: TaskState,
    pub progress: Option<ProgressState>,
}

pub struct SubmissionService {
    job_store: Arc<dyn JobStore>,
    broker: Arc<dyn TaskBroker>,
    registry: Arc<AnalyzerRegistry>,
    tracker: Arc<dyn ProgressTracker>,
    settings: SubmissionSettings,
}

impl SubmissionService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        broker: Arc<dyn TaskBroker>,
        registry: Arc<AnalyzerRegistry>,
        tracker: Arc<dyn ProgressTracker>,
        settings: SubmissionSettings,
    ) -> Self {
        Self {
            job_store,
            broker,
            registry,
            tracker,
            settings,
        }
    }

    #[tracing::instrument(skip(self, payload), fields(documents = payload.documents.len()))]
    pub async fn submit(&self, mut payload: JobPayload) -> Result<JobId, SubmissionError> {
        self.check_document_count(payload.documents.len())?;

        let policy = payload
            .filter_policy
            .clone()
            .unwrap_or_else(|| self.settings.default_filter_policy.clone());
        self.registry.plan(&payload.stages, &policy)?;
        payload.filter_policy = Some(policy);

        self.enqueue(PendingJob::batch(payload)).await
    }

    #[tracing::instrument(skip(self, files, stages), fields(files = files.len()))]
    pub async fn submit_files(
        &self,
        files: Vec<PendingFile>,
        stages: Option<Vec<StageName>>,
    ) -> Result<JobId, SubmissionError> {
        self.check_document_count(files.len())?;

        let stages = stages.unwrap_or_else(|| self.settings.file_stages.clone());
        self.registry.plan(&stages, &FilterPolicy::None)?;

        let options = FileJobOptions {
            stages,
            dont_delete: self.settings.archive_dont_delete,
        };

        self.enqueue(PendingJob::files(options, files)).await
    }

    /// Client-visible state. Falls back to the store when no progress is tracked,
    /// e.g. after a restart.
    pub async fn status(&self, job_id: JobId) -> Result<JobStatusView, SubmissionError> {
        if let Some(progress) = self.tracker.get(job_id).await {
            return Ok(JobStatusView {
                job_id,
                state: progress.phase.task_state(),
                progress: Some(progress),
            });
        }

        if self
            .job_store
            .fetch_completed(job_id)
            .await
            .map_err(SubmissionError::Store)?
            .is_some()
        {
            return Ok(JobStatusView {
                job_id,
                state: TaskState::Success,
                progress: Some(ProgressState::at_milestone(Phase::Done, "done!")),
            });
        }

        match self
            .job_store
            .pending_status(job_id)
            .await
            .map_err(SubmissionError::Store)?
        {
            Some(PendingStatus::Waiting) => Ok(JobStatusView {
                job_id,
                state: TaskState::Pending,
                progress: None,
            }),
            Some(PendingStatus::Claimed) => Ok(JobStatusView {
                job_id,
                state: TaskState::Progress,
                progress: None,
            }),
            Some(PendingStatus::Failed(diagnostic)) => Ok(JobStatusView {
                job_id,
                state: TaskState::Failure,
                progress: Some(ProgressState::new(Phase::Failed, 0, diagnostic)),
            }),
            None => Err(SubmissionError::NotFound(job_id)),
        }
    }

    pub async fn result(&self, job_id: JobId) -> Result<Vec<Article>, SubmissionError> {
        self.job_store
            .fetch_completed(job_id)
            .await
            .map_err(SubmissionError::Store)?
            .map(|completed| completed.result)
            .ok_or(SubmissionError::NotFound(job_id))
    }

    fn check_document_count(&self, count: usize) -> Result<(), SubmissionError> {
        if count == 0 {
            return Err(SubmissionError::Validation(
                "submission contains no documents".to_string(),
            ));
        }
        if count > self.settings.max_documents {
            return Err(SubmissionError::Validation(format!(
                "submission contains {} documents, limit is {}",
                count, self.settings.max_documents
            )));
        }
        Ok(())
    }

    async fn enqueue(&self, job: PendingJob) -> Result<JobId, SubmissionError> {
        let job_id = job.id;
        let kind = TaskKind::for_job(job.kind());

        self.job_store
            .submit(&job)
            .await
            .map_err(SubmissionError::Store)?;

        self.tracker
            .publish(job_id, ProgressState::at_milestone(Phase::Queued, "queued"))
            .await;

        if let Err(source) = self.broker.dispatch(Task { job_id, kind }).await {
            tracing::error!(
                job_id = %job_id,
                error = %source,
                "Dispatch failed after enqueue, job left for the reconciler"
            );
            return Err(SubmissionError::Dispatch { job_id, source });
        }

        if let Err(e) = self.job_store.mark_dispatched(job_id, Utc::now()).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to record dispatch");
        }

        tracing::info!(job_id = %job_id, kind = %kind, "Annotation job enqueued");
        Ok(job_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("invalid submission: {0}")]
    Validation(String),
    #[error("invalid stage plan: {0}")]
    Plan(#[from] RegistryError),
    #[error("job store: {0}")]
    Store(JobStoreError),
    #[error("job {job_id} was queued but could not be dispatched: {source}")]
    Dispatch {
        job_id: JobId,
        #[source]
        source: BrokerError,
    },
    #[error("job not found: {0}")]
    NotFound(JobId),
}
