//! Domain types and configuration shared by every `segdb` crate.

mod app_config;
mod config;
pub mod customers;
pub mod pagination;
pub mod segmentation;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use customers::{Customer, CustomerRecord, Gender, Segment};
pub use pagination::{
    PageRequest, Pagination, DEFAULT_CUSTOMER_LIMIT, DEFAULT_HISTORY_LIMIT, MAX_PAGE_LIMIT,
};
pub use segmentation::{
    Algorithm, ClusterMetrics, Parameters, RunStatus, Visualizations, NOISE_CLUSTER_ID,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown algorithm: {0} (expected kmeans, hierarchical or dbscan)")]
    InvalidAlgorithm(String),

    #[error("unknown run status: {0}")]
    InvalidRunStatus(String),

    #[error("unknown gender: {0} (expected Male, Female or Other)")]
    InvalidGender(String),

    #[error("invalid customer {customer_id}: {reason}")]
    InvalidCustomer { customer_id: i64, reason: String },
}
