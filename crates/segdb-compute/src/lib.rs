//! Client for the external clustering engine: typed requests, bounded
//! timeouts, a single retry for read-only calls, and response contract
//! validation.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod types;
mod validate;

pub use client::{ComputeClient, DEFAULT_BASE_URL};
pub use error::ComputeError;
pub use types::{ClusterAssignment, ClusterProfile, ComputeResponse, ElbowCurve, Prediction};
