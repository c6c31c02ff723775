mod analyzer;
mod file_loader;
mod job_store;
mod progress_tracker;
mod synthesizer;
mod task_broker;
mod text_preparer;

pub use analyzer::{Analyzer, AnalyzerError, AnnotationMode};
pub use file_loader::{FileLoader, FileLoaderError};
pub use job_store::{ClaimOutcome, JobStore, JobStoreError};
pub use progress_tracker::ProgressTracker;
pub use synthesizer::{SynthesisError, Synthesizer};
pub use task_broker::{BrokerError, Task, TaskBroker, TaskKind, TaskSubscription};
pub use text_preparer::{TextPreparer, TextPreparerError};
