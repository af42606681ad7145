//! Background job scheduler.
//!
//! Runs the reconciliation sweep on `SEGDB_SWEEP_CRON`: runs stuck in
//! `pending` past the grace window are failed, and retirement is re-run for
//! every algorithm's current generation.

use std::sync::Arc;
use std::time::Duration;

use segdb_core::AppConfig;
use segdb_db::SegmentationStore;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// cron expression is rejected, or the scheduler fails to start.
pub async fn build_scheduler(
    store: Arc<dyn SegmentationStore>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_sweep_job(
        &scheduler,
        store,
        &config.sweep_cron,
        Duration::from_secs(config.pending_grace_secs),
    )
    .await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sweep_job(
    scheduler: &JobScheduler,
    store: Arc<dyn SegmentationStore>,
    cron: &str,
    pending_grace: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let store = Arc::clone(&store);

        Box::pin(async move {
            run_sweep_job(store.as_ref(), pending_grace).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: reconciliation sweep registered");
    Ok(())
}

async fn run_sweep_job(store: &dyn SegmentationStore, pending_grace: Duration) {
    match segdb_engine::sweep(store, pending_grace).await {
        Ok(report) => tracing::debug!(
            failed_pending = report.failed_pending,
            retired_clusters = report.retired_clusters,
            "scheduler: sweep complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use segdb_core::{Algorithm, ClusterMetrics, RunStatus};
    use segdb_db::{MemoryStore, NewClusteringResult};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn sweep_job_fails_abandoned_pending_runs() {
        let store = MemoryStore::new();
        let stale = store
            .insert_pending_result(&NewClusteringResult {
                result_id: Uuid::new_v4(),
                algorithm: Algorithm::Dbscan,
                parameters: serde_json::Map::new(),
                metrics: ClusterMetrics::default(),
                visualizations: serde_json::Map::new(),
                feature_names: vec![],
                pca_variance_explained: vec![],
                started_at: Utc::now() - chrono::Duration::hours(1),
            })
            .await
            .expect("insert");

        run_sweep_job(&store, Duration::from_secs(60)).await;

        let results = store.all_results().await;
        let row = results.iter().find(|r| r.id == stale.id).expect("row");
        assert_eq!(row.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn rejects_invalid_cron_expression() {
        let scheduler = JobScheduler::new().await.expect("scheduler");
        let store: Arc<dyn SegmentationStore> = Arc::new(MemoryStore::new());
        let result =
            register_sweep_job(&scheduler, store, "not a cron", Duration::from_secs(60)).await;
        assert!(result.is_err());
    }
}
