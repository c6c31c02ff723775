mod article;
mod document;
mod job;
mod job_id;
mod progress;
mod stage_name;

pub use article::{Article, ParsedArticle, ParsedText, TextField};
pub use document::{ContentType, Document, DocumentId, content_hash};
pub use job::{
    ArchivedDocument, CompletedJob, FileJobOptions, FilterPolicy, JobInput, JobKind, JobPayload,
    JobRef, PendingFile, PendingJob, PendingStatus,
};
pub use job_id::JobId;
pub use progress::{Phase, ProgressState, TaskState, stage_percentage};
pub use stage_name::{InvalidStageName, StageName};
