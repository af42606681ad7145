//! The read side. Every operation here is a pure read over the store and
//! observes whatever generation is current when it runs.

use std::sync::Arc;

use segdb_core::{
    Algorithm, Customer, PageRequest, Pagination, Visualizations, DEFAULT_CUSTOMER_LIMIT,
    DEFAULT_HISTORY_LIMIT,
};
use segdb_db::{
    ClusterSnapshot, ClusteringResult, CustomerFilter, CustomerStatistics, ResultSummary,
    SegmentationStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ClusterError;

/// A result together with the cluster snapshots it owns.
#[derive(Debug, Clone, Serialize)]
pub struct ResultWithProfiles {
    #[serde(flatten)]
    pub result: ClusteringResult,
    pub profiles: Vec<ClusterSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub result_id: Uuid,
    pub algorithm: Algorithm,
    pub n_clusters: i64,
    pub profiles: Vec<ClusterSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultVisualizations {
    pub result_id: Uuid,
    pub visualizations: Visualizations,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn SegmentationStore>,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService").finish_non_exhaustive()
    }
}

impl QueryService {
    #[must_use]
    pub fn new(store: Arc<dyn SegmentationStore>) -> Self {
        Self { store }
    }

    /// The most recently started completed result, with its profiles.
    ///
    /// # Errors
    ///
    /// [`ClusterError::NotFound`] if no run has completed yet.
    pub async fn latest_result(
        &self,
        algorithm: Option<Algorithm>,
    ) -> Result<ResultWithProfiles, ClusterError> {
        let result = self
            .store
            .latest_completed_result(algorithm)
            .await?
            .ok_or_else(|| no_completed_run(algorithm))?;
        let profiles = self.store.clusters_for_result(result.summary.id).await?;
        Ok(ResultWithProfiles { result, profiles })
    }

    /// Run history, newest first, without visualization blobs.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Persistence`] if the store read fails.
    pub async fn history(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<ResultSummary>, ClusterError> {
        let request = PageRequest::new(page, limit, DEFAULT_HISTORY_LIMIT);
        let total = self.store.count_results().await?;
        let items = self.store.list_results(request).await?;
        Ok(Page {
            items,
            pagination: Pagination::new(request, total),
        })
    }

    /// # Errors
    ///
    /// [`ClusterError::NotFound`] for an unknown `result_id`.
    pub async fn result_detail(&self, result_id: Uuid) -> Result<ResultWithProfiles, ClusterError> {
        let result = self.find_result(result_id).await?;
        let profiles = self.store.clusters_for_result(result.summary.id).await?;
        Ok(ResultWithProfiles { result, profiles })
    }

    /// # Errors
    ///
    /// [`ClusterError::NotFound`] for an unknown `result_id`.
    pub async fn visualizations(
        &self,
        result_id: Uuid,
    ) -> Result<ResultVisualizations, ClusterError> {
        let result = self.find_result(result_id).await?;
        Ok(ResultVisualizations {
            result_id,
            visualizations: result.visualizations,
        })
    }

    /// Cluster profiles of the current generation.
    ///
    /// # Errors
    ///
    /// [`ClusterError::NotFound`] if no run has completed yet.
    pub async fn profiles(
        &self,
        algorithm: Option<Algorithm>,
    ) -> Result<ProfileSummary, ClusterError> {
        let latest = self.latest_result(algorithm).await?;
        let summary = latest.result.summary;
        Ok(ProfileSummary {
            result_id: summary.result_id,
            algorithm: summary.algorithm,
            n_clusters: summary.metrics.n_clusters,
            profiles: latest.profiles,
        })
    }

    /// Customers ordered by id, optionally filtered by cluster and gender.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Persistence`] if the store read fails.
    pub async fn customers(
        &self,
        filter: CustomerFilter,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<Customer>, ClusterError> {
        let request = PageRequest::new(page, limit, DEFAULT_CUSTOMER_LIMIT);
        let total = self.store.count_customers(&filter).await?;
        let items = self.store.list_customers(&filter, request).await?;
        Ok(Page {
            items,
            pagination: Pagination::new(request, total),
        })
    }

    /// # Errors
    ///
    /// [`ClusterError::NotFound`] for an unknown customer.
    pub async fn customer(&self, customer_id: i64) -> Result<Customer, ClusterError> {
        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| ClusterError::NotFound(format!("customer {customer_id} not found")))
    }

    /// # Errors
    ///
    /// [`ClusterError::Persistence`] if the store read fails.
    pub async fn statistics(&self) -> Result<CustomerStatistics, ClusterError> {
        Ok(self.store.customer_statistics().await?)
    }

    async fn find_result(&self, result_id: Uuid) -> Result<ClusteringResult, ClusterError> {
        self.store
            .get_result(result_id)
            .await?
            .ok_or_else(|| ClusterError::NotFound(format!("clustering result {result_id} not found")))
    }
}

fn no_completed_run(algorithm: Option<Algorithm>) -> ClusterError {
    match algorithm {
        Some(a) => ClusterError::NotFound(format!("no completed {a} clustering run yet")),
        None => ClusterError::NotFound("no completed clustering run yet".to_owned()),
    }
}
