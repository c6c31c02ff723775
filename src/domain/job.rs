use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Article, ContentType, Document, DocumentId, JobId, StageName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Batch,
    Files,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Batch => "BATCH",
            JobKind::Files => "FILES",
        }
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BATCH" => Ok(JobKind::Batch),
            "FILES" => Ok(JobKind::Files),
            _ => Err(format!("Invalid job kind: {}", s)),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which documents survive the pre-stage filter.
///
/// `Field(name)` keeps a document when the filter stage's output has `name == true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterPolicy {
    None,
    Field(String),
}

impl FilterPolicy {
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        match trimmed {
            "" => Err("filter policy must not be empty".to_string()),
            "none" => Ok(FilterPolicy::None),
            field => Ok(FilterPolicy::Field(field.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilterPolicy::None => "none",
            FilterPolicy::Field(field) => field,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FilterPolicy::Field(_))
    }
}

impl Serialize for FilterPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FilterPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FilterPolicy::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(alias = "articles")]
    pub documents: Vec<Article>,
    #[serde(default, alias = "robots")]
    pub stages: Vec<StageName>,
    #[serde(
        default,
        rename = "filterPolicy",
        alias = "filter_rcts",
        skip_serializing_if = "Option::is_none"
    )]
    pub filter_policy: Option<FilterPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileJobOptions {
    pub stages: Vec<StageName>,
    pub dont_delete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    pub document: Document,
    pub data: Vec<u8>,
}

impl PendingFile {
    pub fn new(filename: String, content_type: ContentType, data: Vec<u8>) -> Self {
        Self {
            document: Document::new(filename, content_type, &data),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobInput {
    Batch(JobPayload),
    Files {
        options: FileJobOptions,
        files: Vec<PendingFile>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingJob {
    pub id: JobId,
    pub input: JobInput,
    pub submitted_at: DateTime<Utc>,
}

impl PendingJob {
    pub fn batch(payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            input: JobInput::Batch(payload),
            submitted_at: Utc::now(),
        }
    }

    pub fn files(options: FileJobOptions, files: Vec<PendingFile>) -> Self {
        Self {
            id: JobId::new(),
            input: JobInput::Files { options, files },
            submitted_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self.input {
            JobInput::Batch(_) => JobKind::Batch,
            JobInput::Files { .. } => JobKind::Files,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedDocument {
    pub document_id: DocumentId,
    pub filename: String,
    pub sha256: String,
    pub data: Vec<u8>,
    pub annotations: Article,
    pub dont_delete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub id: JobId,
    pub result: Vec<Article>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub archive: Vec<ArchivedDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRef {
    pub id: JobId,
    pub kind: JobKind,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    Waiting,
    Claimed,
    Failed(String),
}
