use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::application::ports::{ClaimOutcome, JobStore, JobStoreError};
use crate::domain::{
    ArchivedDocument, Article, CompletedJob, ContentType, Document, DocumentId, FileJobOptions,
    JobId, JobInput, JobKind, JobPayload, JobRef, PendingFile, PendingJob, PendingStatus,
};

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_files(&self, job_id: Uuid) -> Result<Vec<PendingFile>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, filename, content_type, sha256, data
            FROM pending_files
            WHERE job_id = $1
            ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.into_iter()
            .map(|r| -> Result<PendingFile, JobStoreError> {
                let mime: String = r.try_get("content_type").map_err(query_failed)?;
                let content_type = ContentType::from_mime(&mime).ok_or_else(|| {
                    JobStoreError::Serialization(format!("unknown content type: {}", mime))
                })?;
                let data: Vec<u8> = r.try_get("data").map_err(query_failed)?;

                Ok(PendingFile {
                    document: Document {
                        id: DocumentId::from_uuid(r.try_get("document_id").map_err(query_failed)?),
                        filename: r.try_get("filename").map_err(query_failed)?,
                        content_type,
                        size_bytes: data.len() as u64,
                        sha256: r.try_get("sha256").map_err(query_failed)?,
                    },
                    data,
                })
            })
            .collect()
    }

    async fn decode_pending(&self, id: JobId, row: &PgRow) -> Result<PendingJob, JobStoreError> {
        let kind: String = row.try_get("kind").map_err(query_failed)?;
        let kind = kind.parse::<JobKind>().map_err(JobStoreError::Serialization)?;
        let payload: Value = row.try_get("payload").map_err(query_failed)?;
        let submitted_at: DateTime<Utc> = row.try_get("submitted_at").map_err(query_failed)?;

        let input = match kind {
            JobKind::Batch => JobInput::Batch(
                serde_json::from_value::<JobPayload>(payload).map_err(serialization)?,
            ),
            JobKind::Files => JobInput::Files {
                options: serde_json::from_value::<FileJobOptions>(payload)
                    .map_err(serialization)?,
                files: self.load_files(id.as_uuid()).await?,
            },
        };

        Ok(PendingJob {
            id,
            input,
            submitted_at,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind()))]
    async fn submit(&self, job: &PendingJob) -> Result<(), JobStoreError> {
        let payload = match &job.input {
            JobInput::Batch(payload) => serde_json::to_value(payload),
            JobInput::Files { options, .. } => serde_json::to_value(options),
        }
        .map_err(serialization)?;

        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        sqlx::query(
            r#"
            INSERT INTO pending_jobs (job_id, kind, payload, submitted_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.kind().as_str())
        .bind(payload)
        .bind(job.submitted_at)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        if let JobInput::Files { files, .. } = &job.input {
            for file in files {
                insert_file(&mut tx, job, file).await?;
            }
        }

        tx.commit().await.map_err(query_failed)?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn fetch_pending(&self, id: JobId) -> Result<Option<PendingJob>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT kind, payload, submitted_at
            FROM pending_jobs
            WHERE job_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        match row {
            Some(r) => Ok(Some(self.decode_pending(id, &r).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn claim(
        &self,
        id: JobId,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<ClaimOutcome, JobStoreError> {
        let now = Utc::now();
        let claimed_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .map_err(|e| JobStoreError::Serialization(e.to_string()))?;

        let row = sqlx::query(
            r#"
            UPDATE pending_jobs
            SET claimed_by = $2, claimed_until = $3
            WHERE job_id = $1
              AND failed_at IS NULL
              AND (claimed_until IS NULL OR claimed_until < $4)
            RETURNING kind, payload, submitted_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(worker_id)
        .bind(claimed_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        if let Some(r) = row {
            return Ok(ClaimOutcome::Claimed(self.decode_pending(id, &r).await?));
        }

        let failed: Option<bool> = sqlx::query_scalar(
            "SELECT failed_at IS NOT NULL FROM pending_jobs WHERE job_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(match failed {
            Some(true) => ClaimOutcome::Failed,
            Some(false) => ClaimOutcome::AlreadyClaimed,
            None => ClaimOutcome::NotFound,
        })
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, archived = job.archive.len()))]
    async fn record_completed(&self, job: &CompletedJob) -> Result<(), JobStoreError> {
        let result = serde_json::to_value(&job.result).map_err(serialization)?;

        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        sqlx::query(
            r#"
            INSERT INTO completed_jobs (job_id, result, submitted_at, completed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO UPDATE
            SET result = EXCLUDED.result, completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(result)
        .bind(job.submitted_at)
        .bind(job.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        for document in &job.archive {
            let annotations = serde_json::to_value(&document.annotations).map_err(serialization)?;
            sqlx::query(
                r#"
                INSERT INTO archived_documents
                    (job_id, document_id, filename, sha256, data, annotations, submitted_at, dont_delete)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (job_id, document_id) DO UPDATE
                SET annotations = EXCLUDED.annotations, dont_delete = EXCLUDED.dont_delete
                "#,
            )
            .bind(job.id.as_uuid())
            .bind(document.document_id.as_uuid())
            .bind(&document.filename)
            .bind(&document.sha256)
            .bind(&document.data)
            .bind(annotations)
            .bind(job.submitted_at)
            .bind(document.dont_delete)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        }

        tx.commit().await.map_err(query_failed)?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn delete_pending(&self, id: JobId) -> Result<bool, JobStoreError> {
        let result = sqlx::query("DELETE FROM pending_jobs WHERE job_id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn fetch_completed(&self, id: JobId) -> Result<Option<CompletedJob>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT result, submitted_at, completed_at
            FROM completed_jobs
            WHERE job_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        let Some(r) = row else {
            return Ok(None);
        };

        let result: Value = r.try_get("result").map_err(query_failed)?;
        let result: Vec<Article> = serde_json::from_value(result).map_err(serialization)?;

        let archive_rows = sqlx::query(
            r#"
            SELECT document_id, filename, sha256, data, annotations, dont_delete
            FROM archived_documents
            WHERE job_id = $1
            ORDER BY id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        let archive = archive_rows
            .into_iter()
            .map(|a| -> Result<ArchivedDocument, JobStoreError> {
                let annotations: Value = a.try_get("annotations").map_err(query_failed)?;
                Ok(ArchivedDocument {
                    document_id: DocumentId::from_uuid(
                        a.try_get("document_id").map_err(query_failed)?,
                    ),
                    filename: a.try_get("filename").map_err(query_failed)?,
                    sha256: a.try_get("sha256").map_err(query_failed)?,
                    data: a.try_get("data").map_err(query_failed)?,
                    annotations: serde_json::from_value(annotations).map_err(serialization)?,
                    dont_delete: a.try_get("dont_delete").map_err(query_failed)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CompletedJob {
            id,
            result,
            submitted_at: r.try_get("submitted_at").map_err(query_failed)?,
            completed_at: r.try_get("completed_at").map_err(query_failed)?,
            archive,
        }))
    }

    #[instrument(skip(self, diagnostic), fields(job_id = %id))]
    async fn mark_failed(&self, id: JobId, diagnostic: &str) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            UPDATE pending_jobs
            SET error_message = $2, failed_at = $3, claimed_until = NULL
            WHERE job_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(diagnostic)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn pending_status(&self, id: JobId) -> Result<Option<PendingStatus>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT claimed_by, failed_at, error_message
            FROM pending_jobs
            WHERE job_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        let Some(r) = row else {
            return Ok(None);
        };

        let claimed_by: Option<String> = r.try_get("claimed_by").map_err(query_failed)?;
        let failed_at: Option<DateTime<Utc>> = r.try_get("failed_at").map_err(query_failed)?;
        let error_message: Option<String> = r.try_get("error_message").map_err(query_failed)?;

        Ok(Some(match (failed_at, claimed_by) {
            (Some(_), _) => PendingStatus::Failed(error_message.unwrap_or_default()),
            (None, Some(_)) => PendingStatus::Claimed,
            (None, None) => PendingStatus::Waiting,
        }))
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn mark_dispatched(&self, id: JobId, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE pending_jobs SET dispatched_at = $2 WHERE job_id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_orphans(
        &self,
        undispatched_before: DateTime<Utc>,
        dispatched_before: DateTime<Utc>,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, kind, submitted_at
            FROM pending_jobs
            WHERE claimed_by IS NULL
              AND failed_at IS NULL
              AND (
                (dispatched_at IS NULL AND submitted_at < $1)
                OR dispatched_at < $2
              )
            ORDER BY submitted_at
            "#,
        )
        .bind(undispatched_before)
        .bind(dispatched_before)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.into_iter()
            .map(|r| -> Result<JobRef, JobStoreError> {
                let kind: String = r.try_get("kind").map_err(query_failed)?;
                Ok(JobRef {
                    id: JobId::from_uuid(r.try_get("job_id").map_err(query_failed)?),
                    kind: kind.parse().map_err(JobStoreError::Serialization)?,
                    submitted_at: r.try_get("submitted_at").map_err(query_failed)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn purge_archive(&self, cutoff: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            "DELETE FROM archived_documents WHERE dont_delete = FALSE AND submitted_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(result.rows_affected())
    }
}

async fn insert_file(
    tx: &mut Transaction<'_, Postgres>,
    job: &PendingJob,
    file: &PendingFile,
) -> Result<(), JobStoreError> {
    sqlx::query(
        r#"
        INSERT INTO pending_files
            (job_id, document_id, filename, content_type, sha256, data, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(job.id.as_uuid())
    .bind(file.document.id.as_uuid())
    .bind(&file.document.filename)
    .bind(file.document.content_type.as_mime())
    .bind(&file.document.sha256)
    .bind(&file.data)
    .bind(job.submitted_at)
    .execute(&mut **tx)
    .await
    .map_err(query_failed)?;

    Ok(())
}

fn query_failed(e: sqlx::Error) -> JobStoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => JobStoreError::ConstraintViolation(db.to_string()),
        _ => JobStoreError::QueryFailed(e.to_string()),
    }
}

fn serialization(e: serde_json::Error) -> JobStoreError {
    JobStoreError::Serialization(e.to_string())
}
