use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::application::ports::{ClaimOutcome, JobStore, JobStoreError};
use crate::domain::{CompletedJob, JobId, JobRef, PendingJob, PendingStatus};

struct PendingRow {
    job: PendingJob,
    claimed_by: Option<String>,
    claimed_until: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

#[derive(Default)]
struct Tables {
    pending: HashMap<JobId, PendingRow>,
    completed: HashMap<JobId, CompletedJob>,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    tables: RwLock<Tables>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn submit(&self, job: &PendingJob) -> Result<(), JobStoreError> {
        let mut tables = self.tables.write().await;
        if tables.pending.contains_key(&job.id) {
            return Err(JobStoreError::ConstraintViolation(format!(
                "pending job {} already exists",
                job.id
            )));
        }
        tables.pending.insert(
            job.id,
            PendingRow {
                job: job.clone(),
                claimed_by: None,
                claimed_until: None,
                dispatched_at: None,
                failure: None,
            },
        );
        Ok(())
    }

    async fn fetch_pending(&self, id: JobId) -> Result<Option<PendingJob>, JobStoreError> {
        let tables = self.tables.read().await;
        Ok(tables.pending.get(&id).map(|row| row.job.clone()))
    }

    async fn claim(
        &self,
        id: JobId,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<ClaimOutcome, JobStoreError> {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(visibility_timeout)
            .map_err(|e| JobStoreError::Serialization(e.to_string()))?;

        let mut tables = self.tables.write().await;
        let Some(row) = tables.pending.get_mut(&id) else {
            return Ok(ClaimOutcome::NotFound);
        };

        if row.failure.is_some() {
            return Ok(ClaimOutcome::Failed);
        }
        if row.claimed_until.is_some_and(|until| until >= now) {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        row.claimed_by = Some(worker_id.to_string());
        row.claimed_until = Some(now + timeout);
        Ok(ClaimOutcome::Claimed(row.job.clone()))
    }

    async fn record_completed(&self, job: &CompletedJob) -> Result<(), JobStoreError> {
        let mut tables = self.tables.write().await;
        tables.completed.insert(job.id, job.clone());
        Ok(())
    }

    async fn delete_pending(&self, id: JobId) -> Result<bool, JobStoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.pending.remove(&id).is_some())
    }

    async fn fetch_completed(&self, id: JobId) -> Result<Option<CompletedJob>, JobStoreError> {
        let tables = self.tables.read().await;
        Ok(tables.completed.get(&id).cloned())
    }

    async fn mark_failed(&self, id: JobId, diagnostic: &str) -> Result<(), JobStoreError> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.pending.get_mut(&id) {
            row.failure = Some(diagnostic.to_string());
            row.claimed_until = None;
        }
        Ok(())
    }

    async fn pending_status(&self, id: JobId) -> Result<Option<PendingStatus>, JobStoreError> {
        let tables = self.tables.read().await;
        Ok(tables.pending.get(&id).map(|row| match (&row.failure, &row.claimed_by) {
            (Some(diagnostic), _) => PendingStatus::Failed(diagnostic.clone()),
            (None, Some(_)) => PendingStatus::Claimed,
            (None, None) => PendingStatus::Waiting,
        }))
    }

    async fn mark_dispatched(&self, id: JobId, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.pending.get_mut(&id) {
            row.dispatched_at = Some(at);
        }
        Ok(())
    }

    async fn list_orphans(
        &self,
        undispatched_before: DateTime<Utc>,
        dispatched_before: DateTime<Utc>,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let tables = self.tables.read().await;
        let mut orphans: Vec<JobRef> = tables
            .pending
            .values()
            .filter(|row| row.claimed_by.is_none() && row.failure.is_none())
            .filter(|row| match row.dispatched_at {
                Some(at) => at < dispatched_before,
                None => row.job.submitted_at < undispatched_before,
            })
            .map(|row| JobRef {
                id: row.job.id,
                kind: row.job.kind(),
                submitted_at: row.job.submitted_at,
            })
            .collect();
        orphans.sort_by_key(|orphan| orphan.submitted_at);
        Ok(orphans)
    }

    async fn purge_archive(&self, cutoff: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let mut tables = self.tables.write().await;
        let mut purged = 0u64;
        for job in tables.completed.values_mut() {
            if job.submitted_at >= cutoff {
                continue;
            }
            let before = job.archive.len();
            job.archive.retain(|document| document.dont_delete);
            purged += (before - job.archive.len()) as u64;
        }
        Ok(purged)
    }
}
