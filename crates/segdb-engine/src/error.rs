use segdb_compute::ComputeError;
use segdb_db::DbError;
use thiserror::Error;

/// Errors surfaced by the run coordinator and the query service. Each
/// variant has a stable machine-readable [`code`](ClusterError::code).
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NoData(String),

    #[error("{0}")]
    NotFound(String),

    /// The engine failed, timed out, or could not be reached.
    #[error("compute engine error: {0}")]
    Upstream(String),

    /// The engine answered with something that cannot be applied.
    #[error("compute engine contract violation: {0}")]
    UpstreamContractViolation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] DbError),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl ClusterError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ClusterError::Validation(_) => "validation_error",
            ClusterError::NoData(_) => "no_data",
            ClusterError::NotFound(_) => "not_found",
            ClusterError::Upstream(_) => "upstream_error",
            ClusterError::UpstreamContractViolation(_) => "upstream_contract_violation",
            ClusterError::Persistence(_) => "persistence_error",
            ClusterError::Conflict(_) => "conflict",
        }
    }
}

impl From<ComputeError> for ClusterError {
    fn from(err: ComputeError) -> Self {
        match err {
            ComputeError::ContractViolation(msg) => ClusterError::UpstreamContractViolation(msg),
            ComputeError::Deserialize { .. } => {
                ClusterError::UpstreamContractViolation(err.to_string())
            }
            ComputeError::Http(_)
            | ComputeError::Timeout(_)
            | ComputeError::Status { .. }
            | ComputeError::InvalidBaseUrl { .. } => ClusterError::Upstream(err.to_string()),
        }
    }
}

impl From<segdb_core::CoreError> for ClusterError {
    fn from(err: segdb_core::CoreError) -> Self {
        ClusterError::Validation(err.to_string())
    }
}
