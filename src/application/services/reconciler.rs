use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::application::ports::{JobStore, JobStoreError, ProgressTracker, Task, TaskBroker, TaskKind};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub orphan_grace: Duration,
    pub redispatch_after: Duration,
    pub sweep_interval: Duration,
    pub progress_ttl: Duration,
    pub archive_retention: Option<Duration>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            orphan_grace: Duration::from_secs(120),
            redispatch_after: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
            progress_ttl: Duration::from_secs(24 * 60 * 60),
            archive_retention: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub redispatched: usize,
    pub dispatch_failures: usize,
    pub evicted: usize,
    pub purged: u64,
}

pub struct Reconciler {
    job_store: Arc<dyn JobStore>,
    broker: Arc<dyn TaskBroker>,
    tracker: Arc<dyn ProgressTracker>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        broker: Arc<dyn TaskBroker>,
        tracker: Arc<dyn ProgressTracker>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            job_store,
            broker,
            tracker,
            settings,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.settings.sweep_interval.as_secs(),
            "Reconciler started"
        );
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(report) if report != SweepReport::default() => {
                    tracing::info!(
                        redispatched = report.redispatched,
                        dispatch_failures = report.dispatch_failures,
                        evicted = report.evicted,
                        purged = report.purged,
                        "Reconciler sweep"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Reconciler sweep failed"),
            }
        }
    }

    /// Startup pass: every unclaimed job gets a task, since tasks queued by a
    /// previous process did not survive it.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<SweepReport, JobStoreError> {
        let now = Utc::now();
        let mut report = SweepReport::default();
        self.redispatch(now, now, &mut report).await?;
        if report.redispatched > 0 || report.dispatch_failures > 0 {
            tracing::info!(
                redispatched = report.redispatched,
                dispatch_failures = report.dispatch_failures,
                "Recovered unclaimed jobs"
            );
        }
        Ok(report)
    }

    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, JobStoreError> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        self.redispatch(
            before(now, self.settings.orphan_grace),
            before(now, self.settings.redispatch_after),
            &mut report,
        )
        .await?;

        report.evicted = self.tracker.evict_finished(self.settings.progress_ttl).await;

        if let Some(retention) = self.settings.archive_retention {
            report.purged = self.job_store.purge_archive(before(now, retention)).await?;
        }

        Ok(report)
    }

    async fn redispatch(
        &self,
        undispatched_before: DateTime<Utc>,
        dispatched_before: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), JobStoreError> {
        for orphan in self
            .job_store
            .list_orphans(undispatched_before, dispatched_before)
            .await?
        {
            let task = Task {
                job_id: orphan.id,
                kind: TaskKind::for_job(orphan.kind),
            };
            if let Err(e) = self.broker.dispatch(task).await {
                tracing::error!(job_id = %orphan.id, error = %e, "Orphan redispatch failed");
                report.dispatch_failures += 1;
                continue;
            }

            tracing::warn!(
                job_id = %orphan.id,
                submitted_at = %orphan.submitted_at,
                "Orphaned job redispatched"
            );
            report.redispatched += 1;
            if let Err(e) = self.job_store.mark_dispatched(orphan.id, Utc::now()).await {
                tracing::warn!(job_id = %orphan.id, error = %e, "Failed to record redispatch");
            }
        }
        Ok(())
    }
}

fn before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
