//! Reconciliation sweep: fails runs abandoned in `pending` and re-runs
//! retirement for every algorithm's current generation.

use std::time::Duration;

use chrono::Utc;
use segdb_db::SegmentationStore;
use serde::Serialize;

use crate::error::ClusterError;

const ABANDONED_MESSAGE: &str = "abandoned: still pending after grace window";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub failed_pending: u64,
    pub retired_clusters: u64,
}

/// Runs one sweep pass.
///
/// Retirement is attempted for each algorithm even when another fails; the
/// first failure is returned after all were tried.
///
/// # Errors
///
/// [`ClusterError::Persistence`] if a store call fails.
pub async fn sweep(
    store: &dyn SegmentationStore,
    pending_grace: Duration,
) -> Result<SweepReport, ClusterError> {
    let grace = chrono::Duration::from_std(pending_grace)
        .map_err(|e| ClusterError::Validation(format!("invalid grace window: {e}")))?;
    let cutoff = Utc::now() - grace;

    let failed_pending = store.fail_stale_pending(cutoff, ABANDONED_MESSAGE).await?;
    if failed_pending > 0 {
        tracing::warn!(failed_pending, "sweep: failed abandoned pending runs");
    }

    let mut report = SweepReport {
        failed_pending,
        retired_clusters: 0,
    };
    let mut first_error = None;
    for (algorithm, current_id) in store.latest_completed_per_algorithm().await? {
        match store.retire_superseded_clusters(algorithm, current_id).await {
            Ok(retired) => {
                if retired > 0 {
                    tracing::info!(%algorithm, retired, "sweep: retired superseded clusters");
                }
                report.retired_clusters += retired;
            }
            Err(e) => {
                tracing::error!(%algorithm, error = %e, "sweep: retirement failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(report),
    }
}
