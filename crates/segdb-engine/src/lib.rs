//! Clustering orchestration: the run coordinator (write side), the query
//! service (read side), and the reconciliation sweep.

pub mod coordinator;
pub mod error;
pub mod marketing;
pub mod query;
pub mod sweep;

pub use coordinator::{
    elbow_range, parse_run_request, PredictOutcome, RunCoordinator, RunOutcome, SampleLoad,
};
pub use error::ClusterError;
pub use query::{Page, ProfileSummary, QueryService, ResultVisualizations, ResultWithProfiles};
pub use sweep::{sweep, SweepReport};
