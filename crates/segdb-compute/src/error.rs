use std::time::Duration;

use thiserror::Error;

/// Errors returned by the compute engine client.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine did not answer within the configured request timeout.
    #[error("compute engine did not respond within {0:?}")]
    Timeout(Duration),

    /// The engine answered with a non-2xx status.
    #[error("compute engine returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response parsed but is missing data or disagrees with the request.
    #[error("compute engine response violates contract: {0}")]
    ContractViolation(String),

    #[error("invalid compute engine base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
