use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::application::ports::{
    AnalyzerError, AnnotationMode, ClaimOutcome, FileLoader, FileLoaderError, JobStore,
    JobStoreError, ProgressTracker, TextPreparer, TextPreparerError,
};
use crate::domain::{
    ArchivedDocument, Article, CompletedJob, FilterPolicy, JobId, JobInput, PendingFile,
    PendingJob, Phase, ProgressState, StageName, TextField, stage_percentage,
};

use super::analyzer_registry::{AnalyzerRegistry, RegisteredStage, RegistryError};
use super::synthesis::{SynthesisOutcome, SynthesisStep};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub visibility_timeout: Duration,
    pub default_filter_policy: FilterPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(15 * 60),
            default_filter_policy: FilterPolicy::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed {
        documents: usize,
        skipped: usize,
        synthesis: Vec<SynthesisOutcome>,
    },
    AlreadyCompleted,
    AlreadyClaimed,
    AlreadyFailed,
    Missing,
}

pub struct PipelineExecutor {
    job_store: Arc<dyn JobStore>,
    registry: Arc<AnalyzerRegistry>,
    tracker: Arc<dyn ProgressTracker>,
    text_preparer: Arc<dyn TextPreparer>,
    file_loader: Arc<dyn FileLoader>,
    synthesis: Option<SynthesisStep>,
    settings: ExecutorSettings,
}

impl PipelineExecutor {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        registry: Arc<AnalyzerRegistry>,
        tracker: Arc<dyn ProgressTracker>,
        text_preparer: Arc<dyn TextPreparer>,
        file_loader: Arc<dyn FileLoader>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            job_store,
            registry,
            tracker,
            text_preparer,
            file_loader,
            synthesis: None,
            settings,
        }
    }

    pub fn with_synthesis(mut self, step: SynthesisStep) -> Self {
        self.synthesis = Some(step);
        self
    }

    #[tracing::instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn execute(
        &self,
        job_id: JobId,
        worker_id: &str,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let claim = self
            .job_store
            .claim(job_id, worker_id, self.settings.visibility_timeout)
            .await
            .map_err(PipelineError::Store)?;

        let job = match claim {
            ClaimOutcome::Claimed(job) => job,
            ClaimOutcome::AlreadyClaimed => {
                tracing::info!("Job already claimed by another worker, dropping duplicate task");
                return Ok(ExecutionOutcome::AlreadyClaimed);
            }
            ClaimOutcome::Failed => {
                tracing::info!("Job previously failed, dropping redelivered task");
                return Ok(ExecutionOutcome::AlreadyFailed);
            }
            ClaimOutcome::NotFound => return self.resolve_unclaimable(job_id).await,
        };

        let result = match self.job_store.fetch_completed(job_id).await {
            Ok(Some(_)) => {
                self.remove_stale_pending(job_id).await;
                return Ok(ExecutionOutcome::AlreadyCompleted);
            }
            Ok(None) => {
                self.publish(job_id, Phase::Fetching, "received request, fetching data")
                    .await;
                self.run(&job).await
            }
            Err(e) => Err(PipelineError::Store(e)),
        };

        if let Err(e) = &result {
            self.fail(job_id, e).await;
        }
        result
    }

    async fn remove_stale_pending(&self, job_id: JobId) {
        tracing::warn!("Stale pending row for completed job, removing");
        if let Err(e) = self.job_store.delete_pending(job_id).await {
            tracing::error!(error = %e, "Failed to remove stale pending row");
        }
    }

    async fn resolve_unclaimable(&self, job_id: JobId) -> Result<ExecutionOutcome, PipelineError> {
        let completed = self
            .job_store
            .fetch_completed(job_id)
            .await
            .map_err(PipelineError::Store)?;

        if completed.is_some() {
            tracing::info!("Job already completed, dropping duplicate task");
            return Ok(ExecutionOutcome::AlreadyCompleted);
        }

        tracing::warn!("Task received for unknown job");
        Ok(ExecutionOutcome::Missing)
    }

    async fn run(&self, job: &PendingJob) -> Result<ExecutionOutcome, PipelineError> {
        let (mut articles, mode, requested, policy) = match &job.input {
            JobInput::Batch(payload) => (
                payload.documents.clone(),
                AnnotationMode::TextBatch,
                payload.stages.clone(),
                payload
                    .filter_policy
                    .clone()
                    .unwrap_or_else(|| self.settings.default_filter_policy.clone()),
            ),
            JobInput::Files { options, files } => {
                self.publish(job.id, Phase::Extraction, "reading documents")
                    .await;
                let articles = self.extract(files).await?;
                (
                    articles,
                    AnnotationMode::FullDocument,
                    options.stages.clone(),
                    FilterPolicy::None,
                )
            }
        };

        let plan = self.registry.plan(&requested, &policy)?;
        let mut executed: Vec<StageName> = Vec::with_capacity(plan.stages.len() + 1);

        if let (Some(filter), FilterPolicy::Field(field)) = (&plan.filter, &policy) {
            let stage = self.stage(filter)?;
            self.tracker
                .publish(
                    job.id,
                    ProgressState::at_milestone(Phase::Filtering, &stage.description),
                )
                .await;
            self.apply_filter(stage, field, &mut articles, mode).await?;
            executed.push(filter.clone());
        }

        self.publish(job.id, Phase::TextPreparation, "tokenizing data")
            .await;
        self.prepare_text(&mut articles).await?;

        let total = plan.stages.len();
        for (index, name) in plan.stages.iter().enumerate() {
            let stage = self.stage(name)?;
            self.tracker
                .publish(
                    job.id,
                    ProgressState::new(
                        Phase::Stage(name.clone()),
                        stage_percentage(index, total),
                        &stage.description,
                    ),
                )
                .await;
            self.run_stage(stage, &mut articles, mode).await?;
            executed.push(name.clone());
        }

        let synthesis = match &self.synthesis {
            Some(step) if step.applies_to(&executed) => {
                self.publish(job.id, Phase::Synthesis, "running synthesis")
                    .await;
                step.run(&mut articles).await
            }
            Some(step) => {
                tracing::debug!(
                    source_stage = %step.plan().source_stage,
                    "Synthesis source stage not run, skipping synthesis"
                );
                Vec::new()
            }
            None => Vec::new(),
        };

        self.publish(
            job.id,
            Phase::Persisting,
            "writing the predictions to database",
        )
        .await;

        for article in &mut articles {
            article.clear_parsed();
        }

        let archive = match &job.input {
            JobInput::Files { options, files } => files
                .iter()
                .zip(&articles)
                .map(|(file, article)| ArchivedDocument {
                    document_id: file.document.id,
                    filename: file.document.filename.clone(),
                    sha256: file.document.sha256.clone(),
                    data: file.data.clone(),
                    annotations: article.clone(),
                    dont_delete: options.dont_delete,
                })
                .collect(),
            JobInput::Batch(_) => Vec::new(),
        };

        let documents = articles.len();
        let skipped = articles.iter().filter(|a| a.is_skipped()).count();

        let completed = CompletedJob {
            id: job.id,
            result: articles,
            submitted_at: job.submitted_at,
            completed_at: Utc::now(),
            archive,
        };

        self.job_store
            .record_completed(&completed)
            .await
            .map_err(PipelineError::Persistence)?;

        if let Err(e) = self.job_store.delete_pending(job.id).await {
            tracing::error!(
                error = %e,
                "Failed to delete pending rows after completion, row left stale"
            );
        }

        self.publish(job.id, Phase::Done, "done!").await;
        tracing::info!(documents, skipped, "Pipeline completed");

        Ok(ExecutionOutcome::Completed {
            documents,
            skipped,
            synthesis,
        })
    }

    fn stage(&self, name: &StageName) -> Result<&RegisteredStage, PipelineError> {
        self.registry
            .get(name.as_str())
            .ok_or_else(|| PipelineError::Plan(RegistryError::UnknownStage(name.to_string())))
    }

    async fn extract(&self, files: &[PendingFile]) -> Result<Vec<Article>, PipelineError> {
        let mut articles = Vec::with_capacity(files.len());

        for file in files {
            let text = self
                .file_loader
                .extract_text(&file.data, &file.document)
                .await
                .map_err(|source| PipelineError::Extraction {
                    filename: file.document.filename.clone(),
                    source,
                })?;

            let mut fields = Map::new();
            fields.insert(
                "document_id".to_string(),
                Value::String(file.document.id.as_uuid().to_string()),
            );
            fields.insert(
                "filename".to_string(),
                Value::String(file.document.filename.clone()),
            );
            fields.insert(
                "sha256".to_string(),
                Value::String(file.document.sha256.clone()),
            );

            let mut article = Article::default().with_text(TextField::FullText, text);
            article.fields = fields;
            articles.push(article);
        }

        Ok(articles)
    }

    async fn apply_filter(
        &self,
        stage: &RegisteredStage,
        field: &str,
        articles: &mut [Article],
        mode: AnnotationMode,
    ) -> Result<(), PipelineError> {
        let indices = active_indices(articles);
        let results = self.annotate(stage, articles, &indices, mode).await?;

        let mut kept = 0usize;
        for (index, result) in indices.iter().copied().zip(results) {
            let passes = match result.get(field) {
                Some(Value::Bool(passes)) => *passes,
                Some(_) | None => {
                    tracing::warn!(
                        stage = %stage.name,
                        field,
                        document_index = index,
                        "Filter output lacks a boolean policy field, treating as rejected"
                    );
                    false
                }
            };

            if passes {
                articles[index].annotate(&stage.name, result);
                kept += 1;
            } else {
                articles[index].mark_skipped();
            }
        }

        tracing::info!(
            stage = %stage.name,
            policy = field,
            kept,
            rejected = indices.len() - kept,
            "Filter applied"
        );
        Ok(())
    }

    async fn prepare_text(&self, articles: &mut [Article]) -> Result<(), PipelineError> {
        let indices = active_indices(articles);
        if indices.is_empty() {
            return Ok(());
        }

        for field in TextField::ALL {
            let texts: Vec<String> = indices
                .iter()
                .map(|&i| articles[i].text(field).unwrap_or_default().to_string())
                .collect();

            if texts.iter().all(|t| t.is_empty()) {
                continue;
            }

            let parsed = self.text_preparer.prepare_batch(texts).await?;
            if parsed.len() != indices.len() {
                return Err(PipelineError::TextPreparation(
                    TextPreparerError::BatchMisaligned {
                        expected: indices.len(),
                        actual: parsed.len(),
                    },
                ));
            }

            for (&index, parsed) in indices.iter().zip(parsed) {
                articles[index].parsed.set(field, parsed);
            }
        }

        tracing::debug!(documents = indices.len(), "Text preparation complete");
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: &RegisteredStage,
        articles: &mut [Article],
        mode: AnnotationMode,
    ) -> Result<(), PipelineError> {
        let indices = active_indices(articles);
        if indices.is_empty() {
            tracing::debug!(stage = %stage.name, "No active documents, stage skipped");
            return Ok(());
        }

        tracing::info!(stage = %stage.name, documents = indices.len(), "Starting stage");
        let results = self.annotate(stage, articles, &indices, mode).await?;

        for (&index, result) in indices.iter().zip(results) {
            articles[index].annotate(&stage.name, result);
        }

        tracing::info!(stage = %stage.name, "Completed stage");
        Ok(())
    }

    async fn annotate(
        &self,
        stage: &RegisteredStage,
        articles: &[Article],
        indices: &[usize],
        mode: AnnotationMode,
    ) -> Result<Vec<Value>, PipelineError> {
        let batch: Vec<&Article> = indices.iter().map(|&i| &articles[i]).collect();

        let results = stage
            .analyzer
            .annotate(&batch, mode)
            .await
            .map_err(|source| PipelineError::Stage {
                stage: stage.name.clone(),
                source,
            })?;

        if results.len() != batch.len() {
            return Err(PipelineError::Stage {
                stage: stage.name.clone(),
                source: AnalyzerError::BatchMisaligned {
                    expected: batch.len(),
                    actual: results.len(),
                },
            });
        }

        Ok(results)
    }

    async fn publish(&self, job_id: JobId, phase: Phase, label: &str) {
        self.tracker
            .publish(job_id, ProgressState::at_milestone(phase, label))
            .await;
    }

    async fn fail(&self, job_id: JobId, error: &PipelineError) {
        let diagnostic = error.to_string();
        tracing::error!(error = %diagnostic, "Pipeline failed");

        let last = self
            .tracker
            .get(job_id)
            .await
            .map(|state| state.percentage)
            .unwrap_or(0);
        self.tracker
            .publish(
                job_id,
                ProgressState::new(Phase::Failed, last, diagnostic.clone()),
            )
            .await;

        if let Err(e) = self.job_store.mark_failed(job_id, &diagnostic).await {
            tracing::error!(error = %e, "Failed to record job failure");
        }
    }
}

fn active_indices(articles: &[Article]) -> Vec<usize> {
    articles
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_skipped())
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("job store: {0}")]
    Store(JobStoreError),
    #[error("invalid stage plan: {0}")]
    Plan(#[from] RegistryError),
    #[error("extraction of {filename}: {source}")]
    Extraction {
        filename: String,
        #[source]
        source: FileLoaderError,
    },
    #[error("text preparation: {0}")]
    TextPreparation(#[from] TextPreparerError),
    #[error("stage {stage}: {source}")]
    Stage {
        stage: StageName,
        #[source]
        source: AnalyzerError,
    },
    #[error("persistence: {0}")]
    Persistence(JobStoreError),
}
