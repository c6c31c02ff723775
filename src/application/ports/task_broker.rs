use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{JobId, JobKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ApiAnnotate,
    FileAnnotate,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::ApiAnnotate, TaskKind::FileAnnotate];

    pub fn for_job(kind: JobKind) -> Self {
        match kind {
            JobKind::Batch => TaskKind::ApiAnnotate,
            JobKind::Files => TaskKind::FileAnnotate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ApiAnnotate => "api_annotate",
            TaskKind::FileAnnotate => "file_annotate",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub job_id: JobId,
    pub kind: TaskKind,
}

/// Receiving side of a task kind. Clones share one queue, so each task reaches one worker.
#[derive(Clone)]
pub struct TaskSubscription {
    kind: TaskKind,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
}

impl TaskSubscription {
    pub fn new(kind: TaskKind, receiver: mpsc::Receiver<Task>) -> Self {
        Self {
            kind,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub async fn recv(&self) -> Option<Task> {
        self.receiver.lock().await.recv().await
    }
}

/// At-least-once notification channel between submitters and workers.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    async fn dispatch(&self, task: Task) -> Result<(), BrokerError>;

    fn subscribe(&self, kind: TaskKind) -> Result<TaskSubscription, BrokerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("broker queue full for {0}")]
    QueueFull(TaskKind),
    #[error("no route for task kind {0}")]
    NoRoute(TaskKind),
}
