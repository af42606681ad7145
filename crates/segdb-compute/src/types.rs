//! Wire types for the compute engine HTTP contract, and the validated shapes
//! handed to callers.
//!
//! The engine emits pandas-style `PascalCase` keys (`ClusterID`, `Label`);
//! lower-case aliases are accepted everywhere.

use std::collections::BTreeMap;

use segdb_core::{Algorithm, ClusterMetrics, CustomerRecord, Parameters, Visualizations};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ClusterRequest<'a> {
    pub customers: &'a [CustomerRecord],
    pub algorithm: Algorithm,
    pub params: &'a Parameters,
}

#[derive(Debug, Serialize)]
pub(crate) struct ElbowRequest<'a> {
    pub customers: &'a [CustomerRecord],
    pub k_min: u32,
    pub k_max: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct PredictRequest<'a> {
    pub customer: &'a CustomerRecord,
    pub algorithm: Algorithm,
}

// ---------------------------------------------------------------------------
// Raw responses
// ---------------------------------------------------------------------------

/// `POST /cluster` body as received. Every section is optional here so that
/// absence is reported as a contract violation naming the missing part.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClusterResponse {
    pub metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub visualizations: Option<Visualizations>,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub pca_variance_explained: Vec<f64>,
    pub cluster_profiles: Option<Vec<RawProfile>>,
    pub customers_with_clusters: Option<Vec<RawAssignment>>,
    pub n_clusters: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProfile {
    #[serde(rename = "ClusterID", alias = "cluster_id")]
    pub cluster_id: i64,
    #[serde(rename = "Label", alias = "label", default)]
    pub label: Option<String>,
    #[serde(rename = "Size", alias = "size")]
    pub size: i64,
    #[serde(rename = "Percentage", alias = "percentage", default)]
    pub percentage: Option<f64>,
    /// Feature aggregates such as `AnnualIncome_mean`.
    #[serde(flatten)]
    pub rest: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAssignment {
    #[serde(rename = "CustomerID", alias = "customer_id", alias = "id")]
    pub customer_id: i64,
    #[serde(rename = "ClusterID", alias = "cluster_id")]
    pub cluster_id: i64,
    #[serde(rename = "ClusterLabel", alias = "cluster_label", alias = "label", default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawElbowResponse {
    pub elbow_data: Option<RawElbowData>,
    #[serde(default)]
    pub elbow_plot: Option<String>,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub recommended_k: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawElbowData {
    #[serde(default)]
    pub k_values: Vec<i64>,
    #[serde(default)]
    pub inertias: Vec<f64>,
    #[serde(default)]
    pub silhouette_scores: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPrediction {
    #[serde(alias = "predicted_cluster")]
    pub cluster_id: Option<i64>,
    #[serde(default)]
    pub cluster_label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SampleDataResponse {
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
}

// ---------------------------------------------------------------------------
// Validated shapes
// ---------------------------------------------------------------------------

/// One cluster as profiled by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub cluster_id: i32,
    pub label: String,
    pub size: i32,
    pub percentage: f64,
    pub features: BTreeMap<String, f64>,
}

/// The engine's verdict for one submitted customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub customer_id: i64,
    pub cluster_id: i32,
    pub label: String,
}

/// A `POST /cluster` response that passed contract validation against the
/// submitted dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeResponse {
    pub metrics: ClusterMetrics,
    pub visualizations: Visualizations,
    pub feature_names: Vec<String>,
    pub pca_variance_explained: Vec<f64>,
    pub profiles: Vec<ClusterProfile>,
    pub assignments: Vec<ClusterAssignment>,
    pub n_clusters: i64,
}

/// Inertia and silhouette scores across a range of `k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElbowCurve {
    pub k_values: Vec<i64>,
    pub inertias: Vec<f64>,
    pub silhouette_scores: Vec<f64>,
    pub recommended_k: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elbow_plot: Option<String>,
    pub feature_names: Vec<String>,
}

/// Cluster predicted for a single customer by a previously trained model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub cluster_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_label: Option<String>,
}
