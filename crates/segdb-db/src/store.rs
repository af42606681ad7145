//! The persistence seam the run coordinator and query service write through.
//!
//! [`PgStore`] is the production implementation. [`crate::MemoryStore`]
//! mirrors its semantics for tests that do not need a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use segdb_core::{Algorithm, Customer, CustomerRecord, PageRequest};
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{
    Assignment, ClusterSnapshot, ClusteringResult, CustomerFilter, CustomerStatistics,
    ImportStats, NewCluster, NewClusteringResult, ResultSummary, RunCommit,
};
use crate::{clustering_results, clusters, customers, DbError};

#[async_trait]
pub trait SegmentationStore: Send + Sync {
    /// Verifies the backing store is reachable.
    async fn ping(&self) -> Result<(), DbError>;

    // -- customers ----------------------------------------------------------

    /// Identifier and features of every customer, ordered by id.
    fn customer_records(&self) -> BoxStream<'_, Result<CustomerRecord, DbError>>;

    async fn count_customers(&self, filter: &CustomerFilter) -> Result<i64, DbError>;

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<Vec<Customer>, DbError>;

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, DbError>;

    async fn customer_statistics(&self) -> Result<CustomerStatistics, DbError>;

    /// Inserts new customers and updates features of existing ones without
    /// touching their segmentation.
    async fn upsert_customers(&self, records: &[CustomerRecord]) -> Result<ImportStats, DbError>;

    /// Deletes every customer and loads `records` atomically. Returns the
    /// number deleted and the load counts.
    async fn replace_customers(
        &self,
        records: &[CustomerRecord],
    ) -> Result<(u64, ImportStats), DbError>;

    /// Writes each customer's segmentation. Idempotent.
    async fn apply_assignments(&self, assignments: &[Assignment]) -> Result<u64, DbError>;

    // -- clustering results -------------------------------------------------

    async fn insert_pending_result(
        &self,
        new: &NewClusteringResult,
    ) -> Result<ResultSummary, DbError>;

    async fn insert_clusters(
        &self,
        result: &ResultSummary,
        clusters: &[NewCluster],
    ) -> Result<Vec<ClusterSnapshot>, DbError>;

    /// Applies `assignments` and completes `result` as one unit. Nothing is
    /// written when a later-started run of the same algorithm completed first.
    async fn commit_run(
        &self,
        result: &ResultSummary,
        assignments: &[Assignment],
    ) -> Result<RunCommit, DbError>;

    /// `pending → completed`, refused when a later-started run of the same
    /// algorithm already completed.
    async fn complete_result(&self, id: i64) -> Result<bool, DbError>;

    /// `pending → failed`.
    async fn fail_result(&self, id: i64, error_message: &str) -> Result<(), DbError>;

    async fn retire_superseded_clusters(
        &self,
        algorithm: Algorithm,
        current_id: i64,
    ) -> Result<u64, DbError>;

    async fn fail_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        error_message: &str,
    ) -> Result<u64, DbError>;

    async fn latest_completed_result(
        &self,
        algorithm: Option<Algorithm>,
    ) -> Result<Option<ClusteringResult>, DbError>;

    async fn latest_completed_per_algorithm(&self) -> Result<Vec<(Algorithm, i64)>, DbError>;

    async fn get_result(&self, result_id: Uuid) -> Result<Option<ClusteringResult>, DbError>;

    async fn count_results(&self) -> Result<i64, DbError>;

    async fn list_results(&self, page: PageRequest) -> Result<Vec<ResultSummary>, DbError>;

    async fn clusters_for_result(
        &self,
        clustering_result_id: i64,
    ) -> Result<Vec<ClusterSnapshot>, DbError>;
}

/// [`SegmentationStore`] backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SegmentationStore for PgStore {
    async fn ping(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await.map_err(DbError::from)
    }

    fn customer_records(&self) -> BoxStream<'_, Result<CustomerRecord, DbError>> {
        customers::stream_customer_records(&self.pool)
    }

    async fn count_customers(&self, filter: &CustomerFilter) -> Result<i64, DbError> {
        customers::count_customers(&self.pool, filter).await
    }

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<Vec<Customer>, DbError> {
        customers::list_customers(&self.pool, filter, page).await
    }

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, DbError> {
        customers::get_customer(&self.pool, customer_id).await
    }

    async fn customer_statistics(&self) -> Result<CustomerStatistics, DbError> {
        customers::customer_statistics(&self.pool).await
    }

    async fn upsert_customers(&self, records: &[CustomerRecord]) -> Result<ImportStats, DbError> {
        customers::upsert_customers(&self.pool, records).await
    }

    async fn replace_customers(
        &self,
        records: &[CustomerRecord],
    ) -> Result<(u64, ImportStats), DbError> {
        customers::replace_customers(&self.pool, records).await
    }

    async fn apply_assignments(&self, assignments: &[Assignment]) -> Result<u64, DbError> {
        customers::apply_assignments(&self.pool, assignments).await
    }

    async fn insert_pending_result(
        &self,
        new: &NewClusteringResult,
    ) -> Result<ResultSummary, DbError> {
        clustering_results::insert_pending_result(&self.pool, new).await
    }

    async fn insert_clusters(
        &self,
        result: &ResultSummary,
        new_clusters: &[NewCluster],
    ) -> Result<Vec<ClusterSnapshot>, DbError> {
        clusters::insert_clusters(&self.pool, result, new_clusters).await
    }

    async fn commit_run(
        &self,
        result: &ResultSummary,
        assignments: &[Assignment],
    ) -> Result<RunCommit, DbError> {
        clustering_results::commit_run(&self.pool, result, assignments).await
    }

    async fn complete_result(&self, id: i64) -> Result<bool, DbError> {
        clustering_results::complete_result(&self.pool, id).await
    }

    async fn fail_result(&self, id: i64, error_message: &str) -> Result<(), DbError> {
        clustering_results::fail_result(&self.pool, id, error_message).await
    }

    async fn retire_superseded_clusters(
        &self,
        algorithm: Algorithm,
        current_id: i64,
    ) -> Result<u64, DbError> {
        clusters::retire_superseded_clusters(&self.pool, algorithm, current_id).await
    }

    async fn fail_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        error_message: &str,
    ) -> Result<u64, DbError> {
        clustering_results::fail_stale_pending(&self.pool, older_than, error_message).await
    }

    async fn latest_completed_result(
        &self,
        algorithm: Option<Algorithm>,
    ) -> Result<Option<ClusteringResult>, DbError> {
        clustering_results::latest_completed_result(&self.pool, algorithm).await
    }

    async fn latest_completed_per_algorithm(&self) -> Result<Vec<(Algorithm, i64)>, DbError> {
        clustering_results::latest_completed_per_algorithm(&self.pool).await
    }

    async fn get_result(&self, result_id: Uuid) -> Result<Option<ClusteringResult>, DbError> {
        clustering_results::get_result(&self.pool, result_id).await
    }

    async fn count_results(&self) -> Result<i64, DbError> {
        clustering_results::count_results(&self.pool).await
    }

    async fn list_results(&self, page: PageRequest) -> Result<Vec<ResultSummary>, DbError> {
        clustering_results::list_results(&self.pool, page).await
    }

    async fn clusters_for_result(
        &self,
        clustering_result_id: i64,
    ) -> Result<Vec<ClusterSnapshot>, DbError> {
        clusters::clusters_for_result(&self.pool, clustering_result_id).await
    }
}
