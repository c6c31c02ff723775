mod analyzer_registry;
mod job_worker;
mod pipeline_executor;
mod reconciler;
mod submission_service;
mod synthesis;

pub use analyzer_registry::{
    AnalyzerRegistry, AnalyzerRegistryBuilder, RegisteredStage, RegistryError, StagePlan,
    StageRegistration,
};
pub use job_worker::{JobWorker, spawn_worker_pool};
pub use pipeline_executor::{ExecutionOutcome, ExecutorSettings, PipelineError, PipelineExecutor};
pub use reconciler::{Reconciler, ReconcilerSettings, SweepReport};
pub use submission_service::{
    JobStatusView, SubmissionError, SubmissionService, SubmissionSettings,
};
pub use synthesis::{SynthesisOutcome, SynthesisPlan, SynthesisStep};
