//! In-process [`SegmentationStore`] with the same observable semantics as
//! [`crate::PgStore`]. Used by engine and API tests, and by anything that
//! wants a throwaway store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use segdb_core::{Algorithm, Customer, CustomerRecord, PageRequest, RunStatus, Segment};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{
    Assignment, ClusterCount, ClusterSnapshot, ClusteringResult, CustomerFilter,
    CustomerStatistics, ImportStats, NewCluster, NewClusteringResult, ResultSummary, RunCommit,
};
use crate::store::SegmentationStore;
use crate::DbError;

/// Store operations that can be made to fail once via
/// [`MemoryStore::inject_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    UpsertCustomers,
    InsertResult,
    InsertClusters,
    ApplyAssignments,
    CompleteResult,
    RetireClusters,
}

#[derive(Debug, Default)]
struct State {
    customers: BTreeMap<i64, Customer>,
    results: Vec<ClusteringResult>,
    clusters: Vec<ClusterSnapshot>,
    next_result_id: i64,
    next_cluster_id: i64,
    faults: Vec<StoreOp>,
}

impl State {
    fn take_fault(&mut self, op: StoreOp) -> Result<(), DbError> {
        if let Some(pos) = self.faults.iter().position(|f| *f == op) {
            self.faults.remove(pos);
            return Err(DbError::Sqlx(sqlx::Error::Protocol(format!(
                "injected failure: {op:?}"
            ))));
        }
        Ok(())
    }

    fn upsert(&mut self, records: &[CustomerRecord]) -> ImportStats {
        let now = Utc::now();
        let mut stats = ImportStats::default();
        for record in records {
            stats.total += 1;
            match self.customers.get_mut(&record.customer_id) {
                Some(existing) => {
                    existing.gender = record.gender;
                    existing.age = record.age;
                    existing.annual_income = record.annual_income;
                    existing.spending_score = record.spending_score;
                    existing.updated_at = now;
                    stats.updated += 1;
                }
                None => {
                    self.customers.insert(
                        record.customer_id,
                        Customer {
                            customer_id: record.customer_id,
                            gender: record.gender,
                            age: record.age,
                            annual_income: record.annual_income,
                            spending_score: record.spending_score,
                            segment: None,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    stats.inserted += 1;
                }
            }
        }
        stats
    }

    fn apply(&mut self, assignments: &[Assignment]) -> u64 {
        let now = Utc::now();
        let mut changed = 0;
        for assignment in assignments {
            let Some(customer) = self.customers.get_mut(&assignment.customer_id) else {
                continue;
            };
            let segment = Segment {
                cluster_id: assignment.cluster_id,
                label: assignment.label.clone(),
            };
            if customer.segment.as_ref() != Some(&segment) {
                customer.segment = Some(segment);
                customer.updated_at = now;
                changed += 1;
            }
        }
        changed
    }

    fn newer_completed_exists(&self, algorithm: Algorithm, started_at: DateTime<Utc>) -> bool {
        self.results.iter().any(|r| {
            r.summary.algorithm == algorithm
                && r.summary.status == RunStatus::Completed
                && r.summary.started_at > started_at
        })
    }

    /// `true` when result `id` is pending and not superseded.
    fn completable(&self, id: i64) -> bool {
        self.result_by_id(id).is_some_and(|r| {
            r.summary.status == RunStatus::Pending
                && !self.newer_completed_exists(r.summary.algorithm, r.summary.started_at)
        })
    }

    fn mark_completed(&mut self, id: i64) {
        if let Some(result) = self.results.iter_mut().find(|r| r.summary.id == id) {
            result.summary.status = RunStatus::Completed;
            result.summary.completed_at = Some(Utc::now());
        }
    }

    fn result_by_id(&self, id: i64) -> Option<&ClusteringResult> {
        self.results.iter().find(|r| r.summary.id == id)
    }

    fn latest_completed(&self, algorithm: Option<Algorithm>) -> Option<&ClusteringResult> {
        self.results
            .iter()
            .filter(|r| r.summary.status == RunStatus::Completed)
            .filter(|r| algorithm.is_none_or(|a| r.summary.algorithm == a))
            .max_by_key(|r| (r.summary.started_at, r.summary.created_at, r.summary.id))
    }
}

fn matches_filter(customer: &Customer, filter: &CustomerFilter) -> bool {
    let cluster_ok = filter
        .cluster_id
        .is_none_or(|id| customer.segment.as_ref().is_some_and(|s| s.cluster_id == id));
    let gender_ok = filter.gender.is_none_or(|g| customer.gender == g);
    cluster_ok && gender_ok
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with a database error.
    pub async fn inject_failure(&self, op: StoreOp) {
        self.state.lock().await.faults.push(op);
    }

    /// Every stored cluster snapshot, live and retired, in insertion order.
    pub async fn all_clusters(&self) -> Vec<ClusterSnapshot> {
        self.state.lock().await.clusters.clone()
    }

    /// Every stored result summary, in insertion order.
    pub async fn all_results(&self) -> Vec<ResultSummary> {
        self.state
            .lock()
            .await
            .results
            .iter()
            .map(|r| r.summary.clone())
            .collect()
    }
}

#[async_trait]
impl SegmentationStore for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn customer_records(&self) -> BoxStream<'_, Result<CustomerRecord, DbError>> {
        stream::once(async move {
            self.state
                .lock()
                .await
                .customers
                .values()
                .map(Customer::to_record)
                .collect::<Vec<_>>()
        })
        .flat_map(|records| stream::iter(records.into_iter().map(Ok)))
        .boxed()
    }

    async fn count_customers(&self, filter: &CustomerFilter) -> Result<i64, DbError> {
        let state = self.state.lock().await;
        let count = state
            .customers
            .values()
            .filter(|c| matches_filter(c, filter))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<Vec<Customer>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .customers
            .values()
            .filter(|c| matches_filter(c, filter))
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, DbError> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn customer_statistics(&self) -> Result<CustomerStatistics, DbError> {
        let state = self.state.lock().await;
        let all: Vec<&Customer> = state.customers.values().collect();
        if all.is_empty() {
            return Ok(CustomerStatistics::default());
        }

        #[allow(clippy::cast_precision_loss)]
        let n = all.len() as f64;
        let mut counts: BTreeMap<i32, ClusterCount> = BTreeMap::new();
        for segment in all.iter().filter_map(|c| c.segment.as_ref()) {
            let entry = counts.entry(segment.cluster_id).or_insert_with(|| ClusterCount {
                cluster_id: segment.cluster_id,
                label: segment.label.clone(),
                count: 0,
            });
            if segment.label < entry.label {
                entry.label.clone_from(&segment.label);
            }
            entry.count += 1;
        }

        Ok(CustomerStatistics {
            total_customers: i64::try_from(all.len()).unwrap_or(i64::MAX),
            avg_age: Some(all.iter().map(|c| f64::from(c.age)).sum::<f64>() / n),
            avg_income: Some(all.iter().map(|c| c.annual_income).sum::<f64>() / n),
            avg_spending: Some(all.iter().map(|c| c.spending_score).sum::<f64>() / n),
            min_age: all.iter().map(|c| c.age).min(),
            max_age: all.iter().map(|c| c.age).max(),
            min_income: all.iter().map(|c| c.annual_income).reduce(f64::min),
            max_income: all.iter().map(|c| c.annual_income).reduce(f64::max),
            clusters: counts.into_values().collect(),
        })
    }

    async fn upsert_customers(&self, records: &[CustomerRecord]) -> Result<ImportStats, DbError> {
        for record in records {
            record.validate()?;
        }

        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::UpsertCustomers)?;
        Ok(state.upsert(records))
    }

    async fn replace_customers(
        &self,
        records: &[CustomerRecord],
    ) -> Result<(u64, ImportStats), DbError> {
        for record in records {
            record.validate()?;
        }

        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::UpsertCustomers)?;
        let removed = state.customers.len() as u64;
        state.customers.clear();
        Ok((removed, state.upsert(records)))
    }

    async fn apply_assignments(&self, assignments: &[Assignment]) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::ApplyAssignments)?;
        Ok(state.apply(assignments))
    }

    async fn insert_pending_result(
        &self,
        new: &NewClusteringResult,
    ) -> Result<ResultSummary, DbError> {
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::InsertResult)?;

        if state.results.iter().any(|r| r.summary.result_id == new.result_id) {
            return Err(DbError::Corrupt(format!(
                "duplicate result_id {}",
                new.result_id
            )));
        }

        state.next_result_id += 1;
        let summary = ResultSummary {
            id: state.next_result_id,
            result_id: new.result_id,
            algorithm: new.algorithm,
            parameters: new.parameters.clone(),
            metrics: new.metrics.clone(),
            feature_names: new.feature_names.clone(),
            pca_variance_explained: new.pca_variance_explained.clone(),
            status: RunStatus::Pending,
            error_message: None,
            started_at: new.started_at,
            completed_at: None,
            created_at: Utc::now(),
        };
        state.results.push(ClusteringResult {
            summary: summary.clone(),
            visualizations: new.visualizations.clone(),
        });
        Ok(summary)
    }

    async fn insert_clusters(
        &self,
        result: &ResultSummary,
        clusters: &[NewCluster],
    ) -> Result<Vec<ClusterSnapshot>, DbError> {
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::InsertClusters)?;

        if state.result_by_id(result.id).is_none() {
            return Err(DbError::NotFound);
        }
        let mut seen: Vec<i32> = state
            .clusters
            .iter()
            .filter(|c| c.clustering_result_id == result.id)
            .map(|c| c.cluster_id)
            .collect();
        for cluster in clusters {
            if seen.contains(&cluster.cluster_id) {
                return Err(DbError::Corrupt(format!(
                    "duplicate cluster_id {} for result {}",
                    cluster.cluster_id, result.id
                )));
            }
            seen.push(cluster.cluster_id);
        }

        let now = Utc::now();
        let mut inserted = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            state.next_cluster_id += 1;
            inserted.push(ClusterSnapshot {
                id: state.next_cluster_id,
                clustering_result_id: result.id,
                algorithm: result.algorithm,
                cluster_id: cluster.cluster_id,
                label: cluster.label.clone(),
                size: cluster.size,
                percentage: cluster.percentage,
                features: cluster.features.clone(),
                marketing_notes: cluster.marketing_notes.clone(),
                retired_at: None,
                created_at: now,
            });
        }
        state.clusters.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn commit_run(
        &self,
        result: &ResultSummary,
        assignments: &[Assignment],
    ) -> Result<RunCommit, DbError> {
        let mut state = self.state.lock().await;
        if !state.completable(result.id) {
            return Ok(RunCommit::Superseded);
        }
        // Faults fire before any write, mirroring a rolled-back transaction.
        state.take_fault(StoreOp::ApplyAssignments)?;
        state.take_fault(StoreOp::CompleteResult)?;

        let reassigned = state.apply(assignments);
        state.mark_completed(result.id);
        Ok(RunCommit::Completed { reassigned })
    }

    async fn complete_result(&self, id: i64) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::CompleteResult)?;

        if !state.completable(id) {
            return Ok(false);
        }
        state.mark_completed(id);
        Ok(true)
    }

    async fn fail_result(&self, id: i64, error_message: &str) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        match state
            .results
            .iter_mut()
            .find(|r| r.summary.id == id && r.summary.status == RunStatus::Pending)
        {
            Some(result) => {
                result.summary.status = RunStatus::Failed;
                result.summary.error_message = Some(error_message.to_string());
                result.summary.completed_at = Some(Utc::now());
                Ok(())
            }
            None => Err(DbError::InvalidResultTransition {
                id,
                expected_status: "pending",
            }),
        }
    }

    async fn retire_superseded_clusters(
        &self,
        algorithm: Algorithm,
        current_id: i64,
    ) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        state.take_fault(StoreOp::RetireClusters)?;

        let Some(current_started) = state.result_by_id(current_id).map(|r| r.summary.started_at)
        else {
            return Ok(0);
        };
        let eligible: Vec<i64> = state
            .results
            .iter()
            .filter(|r| r.summary.id != current_id && r.summary.started_at <= current_started)
            .map(|r| r.summary.id)
            .collect();

        let now = Utc::now();
        let mut retired = 0;
        for cluster in &mut state.clusters {
            if cluster.algorithm == algorithm
                && cluster.retired_at.is_none()
                && eligible.contains(&cluster.clustering_result_id)
            {
                cluster.retired_at = Some(now);
                retired += 1;
            }
        }
        Ok(retired)
    }

    async fn fail_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        error_message: &str,
    ) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut failed = 0;
        for result in &mut state.results {
            if result.summary.status == RunStatus::Pending && result.summary.started_at < older_than
            {
                result.summary.status = RunStatus::Failed;
                result.summary.error_message = Some(error_message.to_string());
                result.summary.completed_at = Some(now);
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn latest_completed_result(
        &self,
        algorithm: Option<Algorithm>,
    ) -> Result<Option<ClusteringResult>, DbError> {
        Ok(self.state.lock().await.latest_completed(algorithm).cloned())
    }

    async fn latest_completed_per_algorithm(&self) -> Result<Vec<(Algorithm, i64)>, DbError> {
        let state = self.state.lock().await;
        Ok(Algorithm::ALL
            .into_iter()
            .filter_map(|a| state.latest_completed(Some(a)).map(|r| (a, r.summary.id)))
            .collect())
    }

    async fn get_result(&self, result_id: Uuid) -> Result<Option<ClusteringResult>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .iter()
            .find(|r| r.summary.result_id == result_id)
            .cloned())
    }

    async fn count_results(&self) -> Result<i64, DbError> {
        Ok(i64::try_from(self.state.lock().await.results.len()).unwrap_or(i64::MAX))
    }

    async fn list_results(&self, page: PageRequest) -> Result<Vec<ResultSummary>, DbError> {
        let state = self.state.lock().await;
        let mut summaries: Vec<&ResultSummary> = state.results.iter().map(|r| &r.summary).collect();
        summaries.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(summaries
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn clusters_for_result(
        &self,
        clustering_result_id: i64,
    ) -> Result<Vec<ClusterSnapshot>, DbError> {
        let state = self.state.lock().await;
        let mut clusters: Vec<ClusterSnapshot> = state
            .clusters
            .iter()
            .filter(|c| c.clustering_result_id == clustering_result_id)
            .cloned()
            .collect();
        clusters.sort_by_key(|c| c.cluster_id);
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use segdb_core::{ClusterMetrics, Gender};

    fn record(id: i64) -> CustomerRecord {
        CustomerRecord {
            customer_id: id,
            gender: Gender::Female,
            age: 30,
            annual_income: 50.0,
            spending_score: 60.0,
        }
    }

    fn new_result(algorithm: Algorithm, started_at: DateTime<Utc>) -> NewClusteringResult {
        NewClusteringResult {
            result_id: Uuid::new_v4(),
            algorithm,
            parameters: serde_json::Map::new(),
            metrics: ClusterMetrics {
                n_clusters: 1,
                ..ClusterMetrics::default()
            },
            visualizations: serde_json::Map::new(),
            feature_names: vec!["Age".to_string()],
            pca_variance_explained: vec![],
            started_at,
        }
    }

    fn cluster(cluster_id: i32) -> NewCluster {
        NewCluster {
            cluster_id,
            label: format!("Segment {cluster_id}"),
            size: 1,
            percentage: 100.0,
            features: BTreeMap::new(),
            marketing_notes: vec![],
        }
    }

    #[tokio::test]
    async fn upsert_preserves_existing_segmentation() {
        let store = MemoryStore::new();
        store.upsert_customers(&[record(1)]).await.unwrap();
        store
            .apply_assignments(&[Assignment {
                customer_id: 1,
                cluster_id: 0,
                label: "Careful".to_string(),
            }])
            .await
            .unwrap();

        let mut updated = record(1);
        updated.age = 44;
        let stats = store.upsert_customers(&[updated, record(2)]).await.unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);

        let customer = store.get_customer(1).await.unwrap().unwrap();
        assert_eq!(customer.age, 44);
        assert_eq!(customer.segment.unwrap().label, "Careful");
    }

    #[tokio::test]
    async fn reapplying_assignments_changes_nothing() {
        let store = MemoryStore::new();
        store.upsert_customers(&[record(1), record(2)]).await.unwrap();
        let assignments = vec![
            Assignment {
                customer_id: 1,
                cluster_id: 0,
                label: "A".to_string(),
            },
            Assignment {
                customer_id: 2,
                cluster_id: 1,
                label: "B".to_string(),
            },
        ];
        assert_eq!(store.apply_assignments(&assignments).await.unwrap(), 2);
        assert_eq!(store.apply_assignments(&assignments).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn completion_is_refused_once_a_later_run_completed() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let older = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0))
            .await
            .unwrap();
        let newer = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0 + Duration::seconds(1)))
            .await
            .unwrap();

        assert!(store.complete_result(newer.id).await.unwrap());
        assert!(!store.complete_result(older.id).await.unwrap());
    }

    #[tokio::test]
    async fn superseded_commit_leaves_customers_untouched() {
        let store = MemoryStore::new();
        store.upsert_customers(&[record(1)]).await.unwrap();
        let t0 = Utc::now();
        let older = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0))
            .await
            .unwrap();
        let newer = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0 + Duration::seconds(1)))
            .await
            .unwrap();
        assert!(store.complete_result(newer.id).await.unwrap());

        let outcome = store
            .commit_run(
                &older,
                &[Assignment {
                    customer_id: 1,
                    cluster_id: 3,
                    label: "Stale".to_string(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunCommit::Superseded);
        let customer = store.get_customer(1).await.unwrap().unwrap();
        assert_eq!(customer.segment, None);
        assert_eq!(store.all_results().await[0].status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn failed_commit_writes_no_assignments() {
        let store = MemoryStore::new();
        store.upsert_customers(&[record(1)]).await.unwrap();
        let result = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, Utc::now()))
            .await
            .unwrap();
        let assignments = [Assignment {
            customer_id: 1,
            cluster_id: 0,
            label: "Segment 0".to_string(),
        }];

        store.inject_failure(StoreOp::CompleteResult).await;
        let err = store.commit_run(&result, &assignments).await.unwrap_err();
        assert!(matches!(err, DbError::Sqlx(_)));
        assert_eq!(store.get_customer(1).await.unwrap().unwrap().segment, None);

        let outcome = store.commit_run(&result, &assignments).await.unwrap();
        assert_eq!(outcome, RunCommit::Completed { reassigned: 1 });
        assert_eq!(store.all_results().await[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn failed_replace_keeps_existing_customers() {
        let store = MemoryStore::new();
        store.upsert_customers(&[record(1), record(2)]).await.unwrap();

        store.inject_failure(StoreOp::UpsertCustomers).await;
        assert!(store.replace_customers(&[record(7)]).await.is_err());
        assert_eq!(store.count_customers(&CustomerFilter::default()).await.unwrap(), 2);

        let (deleted, stats) = store.replace_customers(&[record(7)]).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(stats.inserted, 1);
        assert!(store.get_customer(1).await.unwrap().is_none());
        assert!(store.get_customer(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminal_results_cannot_be_failed() {
        let store = MemoryStore::new();
        let result = store
            .insert_pending_result(&new_result(Algorithm::Dbscan, Utc::now()))
            .await
            .unwrap();
        assert!(store.complete_result(result.id).await.unwrap());

        let err = store.fail_result(result.id, "late").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidResultTransition { .. }));
    }

    #[tokio::test]
    async fn retirement_spares_later_started_runs() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let old = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0))
            .await
            .unwrap();
        let current = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0 + Duration::seconds(1)))
            .await
            .unwrap();
        let later = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, t0 + Duration::seconds(2)))
            .await
            .unwrap();
        for r in [&old, &current, &later] {
            store.insert_clusters(r, &[cluster(0)]).await.unwrap();
        }

        let retired = store
            .retire_superseded_clusters(Algorithm::Kmeans, current.id)
            .await
            .unwrap();
        assert_eq!(retired, 1);

        let clusters = store.all_clusters().await;
        let live: Vec<i64> = clusters
            .iter()
            .filter(|c| c.retired_at.is_none())
            .map(|c| c.clustering_result_id)
            .collect();
        assert_eq!(live, vec![current.id, later.id]);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.inject_failure(StoreOp::InsertResult).await;

        let first = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, Utc::now()))
            .await;
        assert!(matches!(first, Err(DbError::Sqlx(_))));
        assert!(store
            .insert_pending_result(&new_result(Algorithm::Kmeans, Utc::now()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn duplicate_cluster_ids_are_rejected() {
        let store = MemoryStore::new();
        let result = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, Utc::now()))
            .await
            .unwrap();
        let err = store
            .insert_clusters(&result, &[cluster(0), cluster(0)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Corrupt(_)));
        assert!(store.all_clusters().await.is_empty());
    }

    #[tokio::test]
    async fn statistics_count_members_per_cluster() {
        let store = MemoryStore::new();
        let mut young = record(1);
        young.age = 20;
        store
            .upsert_customers(&[young, record(2), record(3)])
            .await
            .unwrap();
        store
            .apply_assignments(&[
                Assignment {
                    customer_id: 1,
                    cluster_id: 1,
                    label: "Young".to_string(),
                },
                Assignment {
                    customer_id: 2,
                    cluster_id: 1,
                    label: "Young".to_string(),
                },
            ])
            .await
            .unwrap();

        let stats = store.customer_statistics().await.unwrap();
        assert_eq!(stats.total_customers, 3);
        assert_eq!(stats.min_age, Some(20));
        assert_eq!(stats.max_age, Some(30));
        assert_eq!(stats.clusters.len(), 1);
        assert_eq!(stats.clusters[0].count, 2);
    }
}
