//! Store-level entity types shared by [`crate::PgStore`] and [`crate::MemoryStore`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use segdb_core::{Algorithm, ClusterMetrics, Gender, Parameters, RunStatus, Visualizations};
use serde::Serialize;
use uuid::Uuid;

/// Everything needed to write a new `pending` clustering result.
#[derive(Debug, Clone)]
pub struct NewClusteringResult {
    pub result_id: Uuid,
    pub algorithm: Algorithm,
    pub parameters: Parameters,
    pub metrics: ClusterMetrics,
    pub visualizations: Visualizations,
    pub feature_names: Vec<String>,
    pub pca_variance_explained: Vec<f64>,
    pub started_at: DateTime<Utc>,
}

/// A clustering result without its visualization blobs (history list view).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    #[serde(skip)]
    pub id: i64,
    pub result_id: Uuid,
    pub algorithm: Algorithm,
    pub parameters: Parameters,
    pub metrics: ClusterMetrics,
    pub feature_names: Vec<String>,
    pub pca_variance_explained: Vec<f64>,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A clustering result including its visualization blobs (detail view).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringResult {
    #[serde(flatten)]
    pub summary: ResultSummary,
    pub visualizations: Visualizations,
}

/// A cluster profile to be written for a result.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCluster {
    pub cluster_id: i32,
    pub label: String,
    pub size: i32,
    pub percentage: f64,
    pub features: BTreeMap<String, f64>,
    pub marketing_notes: Vec<String>,
}

/// A stored cluster profile snapshot, owned by exactly one clustering result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSnapshot {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub clustering_result_id: i64,
    pub algorithm: Algorithm,
    pub cluster_id: i32,
    pub label: String,
    pub size: i32,
    pub percentage: f64,
    pub features: BTreeMap<String, f64>,
    pub marketing_notes: Vec<String>,
    pub retired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One customer's new segmentation, keyed by customer id.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub customer_id: i64,
    pub cluster_id: i32,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    pub cluster_id: Option<i32>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub inserted: u64,
    pub updated: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCount {
    pub cluster_id: i32,
    pub label: String,
    pub count: i64,
}

/// Population-wide aggregates plus live per-cluster membership counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerStatistics {
    pub total_customers: i64,
    pub avg_age: Option<f64>,
    pub avg_income: Option<f64>,
    pub avg_spending: Option<f64>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub min_income: Option<f64>,
    pub max_income: Option<f64>,
    pub clusters: Vec<ClusterCount>,
}

/// Outcome of [`crate::SegmentationStore::commit_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommit {
    /// Assignments written and the result marked `completed`.
    Completed { reassigned: u64 },
    /// A later-started run of the same algorithm completed first, or the
    /// result was no longer pending. Nothing was written.
    Superseded,
}
