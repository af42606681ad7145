//! The write side: one clustering run end to end, plus the thin compute
//! orchestrations (elbow, predict, sample data) and customer import.
//!
//! A run moves the store from one consistent segmentation to the next.
//! Writes happen in a fixed order:
//!
//! 1. result row (`pending`)
//! 2. cluster snapshots for that result
//! 3. customer reassignment
//! 4. `pending → completed` compare-and-swap
//! 5. retirement of earlier generations
//!
//! so that at every instant a customer's segmentation points at clusters
//! that exist. Steps 3 and 4 commit as one unit, serialized per algorithm,
//! so a superseded run never rewrites a customer. Any failure in 1–4 marks
//! the result `failed` and skips 5.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::TryStreamExt;
use segdb_compute::{ComputeClient, ComputeResponse, ElbowCurve};
use segdb_core::{Algorithm, ClusterMetrics, CustomerRecord, Parameters, Visualizations};
use segdb_db::{
    Assignment, ClusterSnapshot, ImportStats, NewCluster, NewClusteringResult, ResultSummary,
    RunCommit, SegmentationStore,
};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::ClusterError;
use crate::marketing::marketing_notes;

pub const DEFAULT_K_MIN: u32 = 2;
pub const DEFAULT_K_MAX: u32 = 11;
/// Widest elbow range accepted in one request.
pub const MAX_K_SPAN: u32 = 20;

/// What a successful run reports back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub result_id: Uuid,
    pub algorithm: Algorithm,
    pub metrics: ClusterMetrics,
    pub profiles: Vec<ClusterSnapshot>,
    pub visualizations: Visualizations,
    pub n_clusters: i64,
    pub customers_reassigned: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictOutcome {
    pub algorithm: Algorithm,
    pub cluster_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_label: Option<String>,
    pub customer: CustomerRecord,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SampleLoad {
    pub deleted: u64,
    pub imported: ImportStats,
}

/// Checks the raw run request: a known algorithm and, if present, a JSON
/// object of parameters. `null` parameters mean "engine defaults".
///
/// # Errors
///
/// Returns [`ClusterError::Validation`] for an unknown algorithm or
/// non-object parameters.
pub fn parse_run_request(
    algorithm: &str,
    params: Option<serde_json::Value>,
) -> Result<(Algorithm, Parameters), ClusterError> {
    let algorithm = algorithm.parse::<Algorithm>()?;
    let params = match params {
        None | Some(serde_json::Value::Null) => Parameters::new(),
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => {
            return Err(ClusterError::Validation(
                "params must be a JSON object".to_owned(),
            ))
        }
    };
    Ok((algorithm, params))
}

/// Validates an elbow range, applying the 2..11 defaults.
///
/// # Errors
///
/// Returns [`ClusterError::Validation`] unless
/// `2 <= k_min < k_max <= k_min + 20`.
pub fn elbow_range(k_min: Option<i64>, k_max: Option<i64>) -> Result<(u32, u32), ClusterError> {
    let k_min = k_min.unwrap_or(i64::from(DEFAULT_K_MIN));
    let k_max = k_max.unwrap_or(i64::from(DEFAULT_K_MAX));
    if k_min < 2 || k_max <= k_min || k_max - k_min > i64::from(MAX_K_SPAN) {
        return Err(ClusterError::Validation(format!(
            "invalid k range {k_min}..{k_max}: need 2 <= k_min < k_max <= k_min + {MAX_K_SPAN}"
        )));
    }
    let to_u32 = |k: i64| {
        u32::try_from(k).map_err(|_| ClusterError::Validation(format!("k value {k} too large")))
    };
    Ok((to_u32(k_min)?, to_u32(k_max)?))
}

/// One async mutex per algorithm. Holding the guard is the right to run
/// that algorithm in this process.
#[derive(Debug)]
struct RunSlots {
    slots: [Arc<Mutex<()>>; 3],
}

impl RunSlots {
    fn new() -> Self {
        Self {
            slots: [
                Arc::new(Mutex::new(())),
                Arc::new(Mutex::new(())),
                Arc::new(Mutex::new(())),
            ],
        }
    }

    async fn acquire(
        &self,
        algorithm: Algorithm,
        wait: Duration,
    ) -> Result<OwnedMutexGuard<()>, ClusterError> {
        let slot = match algorithm {
            Algorithm::Kmeans => &self.slots[0],
            Algorithm::Hierarchical => &self.slots[1],
            Algorithm::Dbscan => &self.slots[2],
        };
        tokio::time::timeout(wait, Arc::clone(slot).lock_owned())
            .await
            .map_err(|_| {
                ClusterError::Conflict(format!(
                    "a {algorithm} run is already in progress; gave up after {wait:?}"
                ))
            })
    }
}

pub struct RunCoordinator {
    store: Arc<dyn SegmentationStore>,
    compute: ComputeClient,
    slots: RunSlots,
    slot_wait: Duration,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("compute", &self.compute)
            .field("slot_wait", &self.slot_wait)
            .finish_non_exhaustive()
    }
}

impl RunCoordinator {
    /// The per-algorithm slot wait defaults to the compute timeout.
    #[must_use]
    pub fn new(store: Arc<dyn SegmentationStore>, compute: ComputeClient) -> Self {
        let slot_wait = compute.timeout();
        Self {
            store,
            compute,
            slots: RunSlots::new(),
            slot_wait,
        }
    }

    #[must_use]
    pub fn with_slot_wait(mut self, slot_wait: Duration) -> Self {
        self.slot_wait = slot_wait;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SegmentationStore> {
        &self.store
    }

    /// Runs `algorithm` over the whole customer population and commits the
    /// outcome as the new current segmentation.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::Conflict`] if the run slot stays busy past the wait
    ///   bound, or a later-started run of the same algorithm completed first.
    /// - [`ClusterError::NoData`] if there are no customers.
    /// - [`ClusterError::Upstream`] / [`ClusterError::UpstreamContractViolation`]
    ///   if the engine call fails or its answer is unusable. Nothing is
    ///   written in that case.
    /// - [`ClusterError::Persistence`] if a store write fails; the result is
    ///   then marked `failed`.
    pub async fn run_clustering(
        &self,
        algorithm: Algorithm,
        params: Parameters,
    ) -> Result<RunOutcome, ClusterError> {
        let _slot = self.slots.acquire(algorithm, self.slot_wait).await?;
        let started_at = Utc::now();
        let result_id = Uuid::new_v4();

        let customers: Vec<CustomerRecord> = self.store.customer_records().try_collect().await?;
        if customers.is_empty() {
            return Err(ClusterError::NoData(
                "no customers to cluster; import customers first".to_owned(),
            ));
        }

        tracing::info!(
            %algorithm,
            %result_id,
            customers = customers.len(),
            "clustering run started"
        );

        let response = self
            .compute
            .run_algorithm(&customers, algorithm, &params)
            .await
            .map_err(|e| {
                tracing::warn!(%algorithm, %result_id, error = %e, "compute call failed");
                ClusterError::from(e)
            })?;

        let summary = self
            .store
            .insert_pending_result(&NewClusteringResult {
                result_id,
                algorithm,
                parameters: params,
                metrics: response.metrics.clone(),
                visualizations: response.visualizations.clone(),
                feature_names: response.feature_names.clone(),
                pca_variance_explained: response.pca_variance_explained.clone(),
                started_at,
            })
            .await
            .map_err(|e| {
                tracing::error!(%algorithm, %result_id, error = %e, "failed to record run");
                ClusterError::from(e)
            })?;

        let (profiles, customers_reassigned) = match self.commit(&summary, &response).await {
            Ok(committed) => committed,
            Err(e) => {
                self.fail_best_effort(&summary, &e).await;
                return Err(e);
            }
        };

        match self
            .store
            .retire_superseded_clusters(algorithm, summary.id)
            .await
        {
            Ok(retired) => {
                tracing::debug!(%algorithm, %result_id, retired, "retired earlier generations");
            }
            Err(e) => {
                tracing::warn!(
                    %algorithm,
                    %result_id,
                    error = %e,
                    "retirement deferred to sweep"
                );
            }
        }

        tracing::info!(
            %algorithm,
            %result_id,
            n_clusters = response.n_clusters,
            customers_reassigned,
            "clustering run completed"
        );

        Ok(RunOutcome {
            result_id,
            algorithm,
            metrics: response.metrics,
            profiles,
            visualizations: response.visualizations,
            n_clusters: response.n_clusters,
            customers_reassigned,
        })
    }

    /// Steps 2–4 of the write protocol. Errors leave the result `pending`
    /// for the caller to fail.
    async fn commit(
        &self,
        summary: &ResultSummary,
        response: &ComputeResponse,
    ) -> Result<(Vec<ClusterSnapshot>, u64), ClusterError> {
        let new_clusters: Vec<NewCluster> = response
            .profiles
            .iter()
            .map(|p| NewCluster {
                cluster_id: p.cluster_id,
                label: p.label.clone(),
                size: p.size,
                percentage: p.percentage,
                features: p.features.clone(),
                marketing_notes: marketing_notes(&p.label),
            })
            .collect();
        let profiles = self.store.insert_clusters(summary, &new_clusters).await?;

        let assignments: Vec<Assignment> = response
            .assignments
            .iter()
            .map(|a| Assignment {
                customer_id: a.customer_id,
                cluster_id: a.cluster_id,
                label: a.label.clone(),
            })
            .collect();
        match self.store.commit_run(summary, &assignments).await? {
            RunCommit::Completed { reassigned } => Ok((profiles, reassigned)),
            RunCommit::Superseded => Err(ClusterError::Conflict(format!(
                "superseded by a newer {} run",
                summary.algorithm
            ))),
        }
    }

    /// Mark the run failed; if that also fails, log it and move on. The
    /// sweep fails abandoned `pending` rows later.
    async fn fail_best_effort(&self, summary: &ResultSummary, cause: &ClusterError) {
        tracing::error!(
            algorithm = %summary.algorithm,
            result_id = %summary.result_id,
            error = %cause,
            "clustering run failed after compute"
        );
        if let Err(e) = self
            .store
            .fail_result(summary.id, &cause.to_string())
            .await
        {
            tracing::error!(
                result_id = %summary.result_id,
                error = %e,
                "failed to mark clustering run as failed"
            );
        }
    }

    /// Asks the engine for an elbow curve over the current population.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Validation`] for a bad range, [`ClusterError::NoData`]
    /// for an empty population, or an upstream error.
    pub async fn elbow(
        &self,
        k_min: Option<i64>,
        k_max: Option<i64>,
    ) -> Result<ElbowCurve, ClusterError> {
        let (k_min, k_max) = elbow_range(k_min, k_max)?;
        let customers: Vec<CustomerRecord> = self.store.customer_records().try_collect().await?;
        if customers.is_empty() {
            return Err(ClusterError::NoData(
                "no customers to analyse; import customers first".to_owned(),
            ));
        }
        let curve = self.compute.elbow_sweep(&customers, k_min, k_max).await?;
        tracing::info!(k_min, k_max, recommended_k = curve.recommended_k, "elbow sweep done");
        Ok(curve)
    }

    /// Predicts a segment for a customer that need not exist. Nothing is
    /// persisted. When the engine omits a label, the label of the matching
    /// cluster in the current generation is used.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Validation`] for out-of-range features, or an
    /// upstream error.
    pub async fn predict(
        &self,
        customer: CustomerRecord,
        algorithm: Algorithm,
    ) -> Result<PredictOutcome, ClusterError> {
        customer.validate()?;
        let prediction = self.compute.predict_one(&customer, algorithm).await?;

        let cluster_label = match prediction.cluster_label {
            Some(label) => Some(label),
            None => self.current_label(algorithm, prediction.cluster_id).await?,
        };

        Ok(PredictOutcome {
            algorithm,
            cluster_id: prediction.cluster_id,
            cluster_label,
            customer,
        })
    }

    async fn current_label(
        &self,
        algorithm: Algorithm,
        cluster_id: i32,
    ) -> Result<Option<String>, ClusterError> {
        let Some(current) = self.store.latest_completed_result(Some(algorithm)).await? else {
            return Ok(None);
        };
        let clusters = self.store.clusters_for_result(current.summary.id).await?;
        Ok(clusters
            .into_iter()
            .find(|c| c.cluster_id == cluster_id)
            .map(|c| c.label))
    }

    /// Loads the engine's sample customer set, optionally wiping existing
    /// customers first.
    ///
    /// # Errors
    ///
    /// Upstream errors from the engine, [`ClusterError::UpstreamContractViolation`]
    /// if the sample is empty or invalid, or [`ClusterError::Persistence`].
    pub async fn load_sample_data(&self, clear_existing: bool) -> Result<SampleLoad, ClusterError> {
        let sample = self.compute.sample_data().await?;
        if sample.is_empty() {
            return Err(ClusterError::UpstreamContractViolation(
                "engine returned no sample customers".to_owned(),
            ));
        }
        for record in &sample {
            record
                .validate()
                .map_err(|e| ClusterError::UpstreamContractViolation(e.to_string()))?;
        }

        let (deleted, imported) = if clear_existing {
            self.store.replace_customers(&sample).await?
        } else {
            (0, self.store.upsert_customers(&sample).await?)
        };
        tracing::info!(
            deleted,
            inserted = imported.inserted,
            updated = imported.updated,
            "sample data loaded"
        );
        Ok(SampleLoad { deleted, imported })
    }

    /// Upserts customers by id. Existing segmentation is preserved.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Validation`] if the batch is empty or any record is
    /// out of range (nothing is written), or [`ClusterError::Persistence`].
    pub async fn import_customers(
        &self,
        records: &[CustomerRecord],
    ) -> Result<ImportStats, ClusterError> {
        if records.is_empty() {
            return Err(ClusterError::Validation("no customers provided".to_owned()));
        }
        for record in records {
            record.validate()?;
        }
        let stats = self.store.upsert_customers(records).await?;
        tracing::info!(
            inserted = stats.inserted,
            updated = stats.updated,
            "customers imported"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_request_rejects_unknown_algorithm() {
        let err = parse_run_request("spectral", None).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn run_request_requires_object_params() {
        let err = parse_run_request("kmeans", Some(serde_json::json!([1, 2]))).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let (algorithm, params) =
            parse_run_request("DBSCAN", Some(serde_json::json!({ "eps": 0.5 }))).unwrap();
        assert_eq!(algorithm, Algorithm::Dbscan);
        assert_eq!(params["eps"], 0.5);

        let (_, params) = parse_run_request("kmeans", Some(serde_json::Value::Null)).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn elbow_range_defaults_and_bounds() {
        assert_eq!(elbow_range(None, None).unwrap(), (2, 11));
        assert_eq!(elbow_range(Some(3), Some(23)).unwrap(), (3, 23));
        assert!(elbow_range(Some(1), Some(5)).is_err());
        assert!(elbow_range(Some(5), Some(5)).is_err());
        assert!(elbow_range(Some(2), Some(23)).is_err());
        assert!(elbow_range(Some(i64::MAX - 1), Some(i64::MAX)).is_err());
        assert!(elbow_range(Some(2), Some(i64::MAX)).is_err());
        assert!(elbow_range(Some(i64::MIN), Some(5)).is_err());
    }

    #[tokio::test]
    async fn busy_slot_times_out_as_conflict() {
        let slots = RunSlots::new();
        let _held = slots
            .acquire(Algorithm::Kmeans, Duration::from_millis(10))
            .await
            .unwrap();

        let err = slots
            .acquire(Algorithm::Kmeans, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        // Other algorithms are independent.
        assert!(slots
            .acquire(Algorithm::Dbscan, Duration::from_millis(20))
            .await
            .is_ok());
    }
}
