use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CompletedJob, JobId, JobRef, PendingJob, PendingStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(PendingJob),
    AlreadyClaimed,
    Failed,
    NotFound,
}

/// Every method is one short transaction; no lock is held across calls.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn submit(&self, job: &PendingJob) -> Result<(), JobStoreError>;

    async fn fetch_pending(&self, id: JobId) -> Result<Option<PendingJob>, JobStoreError>;

    /// Claims the job if it has not failed and is unclaimed or its previous claim has expired.
    async fn claim(
        &self,
        id: JobId,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<ClaimOutcome, JobStoreError>;

    async fn record_completed(&self, job: &CompletedJob) -> Result<(), JobStoreError>;

    async fn delete_pending(&self, id: JobId) -> Result<bool, JobStoreError>;

    async fn fetch_completed(&self, id: JobId) -> Result<Option<CompletedJob>, JobStoreError>;

    async fn mark_failed(&self, id: JobId, diagnostic: &str) -> Result<(), JobStoreError>;

    async fn pending_status(&self, id: JobId) -> Result<Option<PendingStatus>, JobStoreError>;

    async fn mark_dispatched(&self, id: JobId, at: DateTime<Utc>) -> Result<(), JobStoreError>;

    /// Unclaimed, unfailed jobs whose task is presumed lost: never dispatched and
    /// submitted before `undispatched_before`, or last dispatched before `dispatched_before`.
    async fn list_orphans(
        &self,
        undispatched_before: DateTime<Utc>,
        dispatched_before: DateTime<Utc>,
    ) -> Result<Vec<JobRef>, JobStoreError>;

    async fn purge_archive(&self, cutoff: DateTime<Utc>) -> Result<u64, JobStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}
