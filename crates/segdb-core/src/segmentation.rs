use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Cluster id the engine assigns to points it could not place (DBSCAN noise).
pub const NOISE_CLUSTER_ID: i32 = -1;

/// Clustering algorithms the external engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Kmeans,
    Hierarchical,
    Dbscan,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::Kmeans,
        Algorithm::Hierarchical,
        Algorithm::Dbscan,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Kmeans => "kmeans",
            Algorithm::Hierarchical => "hierarchical",
            Algorithm::Dbscan => "dbscan",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmeans" => Ok(Algorithm::Kmeans),
            "hierarchical" => Ok(Algorithm::Hierarchical),
            "dbscan" => Ok(Algorithm::Dbscan),
            _ => Err(CoreError::InvalidAlgorithm(s.to_string())),
        }
    }
}

/// Algorithm parameters forwarded verbatim to the engine (`n_clusters`,
/// `eps`, `linkage`, ...). Only the engine knows their schema.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Named visualization payloads produced by the engine. Stored and returned
/// as-is; nothing in this workspace looks inside them.
pub type Visualizations = serde_json::Map<String, serde_json::Value>;

/// Cluster-validity scores reported by the engine for one run.
///
/// Scores are absent when the engine could not compute them (fewer than two
/// clusters); `error` then carries the engine's explanation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    #[serde(default)]
    pub n_clusters: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silhouette_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub davies_bouldin_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calinski_harabasz_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_samples: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_noise_points: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lifecycle of a clustering result row: `pending → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` rows never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(CoreError::InvalidRunStatus(s.to_string())),
        }
    }
}
