//! HTTP client for the external clustering engine.
//!
//! Wraps `reqwest` with a per-request timeout, engine error extraction, and
//! response contract validation. Clustering and prediction calls are sent
//! exactly once; the read-only elbow and sample-data calls get one retry on
//! connection failure.

use std::time::Duration;

use reqwest::{Client, Url};
use segdb_core::{Algorithm, AppConfig, CustomerRecord, Parameters};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ComputeError;
use crate::retry::retry_with_backoff;
use crate::types::{
    ClusterRequest, ComputeResponse, ElbowCurve, ElbowRequest, PredictRequest, Prediction,
    RawClusterResponse, RawElbowResponse, RawPrediction, SampleDataResponse,
};
use crate::validate;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001/api";
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
const READ_ONLY_RETRIES: u32 = 1;

/// Client for the clustering engine.
///
/// Use [`ComputeClient::from_app_config`] in binaries or
/// [`ComputeClient::new`] to point at a mock server in tests.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    retry_backoff_ms: u64,
}

impl ComputeClient {
    /// Creates a client for the engine at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ComputeError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ComputeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent("segdb/0.1 (segmentation-orchestrator)")
            .build()?;

        // Exactly one trailing slash so `Url::join` appends instead of
        // replacing the last path segment (`/api` + `cluster`).
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| ComputeError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url: parsed,
            timeout,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        })
    }

    /// Creates a client from the `SEGDB_COMPUTE_*` settings.
    ///
    /// # Errors
    ///
    /// See [`ComputeClient::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ComputeError> {
        Ok(Self::new(
            &config.compute_url,
            Duration::from_secs(config.compute_timeout_secs),
            Duration::from_secs(config.compute_connect_timeout_secs),
        )?
        .with_retry_backoff_ms(config.compute_retry_backoff_ms))
    }

    #[must_use]
    pub fn with_retry_backoff_ms(mut self, retry_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    /// The per-request timeout this client enforces.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `algorithm` over `customers` and validates the response against
    /// the submitted dataset.
    ///
    /// # Errors
    ///
    /// - [`ComputeError::Timeout`] if the engine does not answer in time.
    /// - [`ComputeError::Status`] on a non-2xx response.
    /// - [`ComputeError::Http`] on network failure.
    /// - [`ComputeError::Deserialize`] if the body is not the expected JSON.
    /// - [`ComputeError::ContractViolation`] if the body is incomplete or
    ///   disagrees with `customers`.
    pub async fn run_algorithm(
        &self,
        customers: &[CustomerRecord],
        algorithm: Algorithm,
        params: &Parameters,
    ) -> Result<ComputeResponse, ComputeError> {
        tracing::debug!(%algorithm, customers = customers.len(), "calling compute engine");
        let body = ClusterRequest {
            customers,
            algorithm,
            params,
        };
        let raw: RawClusterResponse = self
            .post_json("cluster", &body, &format!("cluster(algorithm={algorithm})"))
            .await?;
        validate::validate_cluster_response(raw, customers)
    }

    /// Computes inertia and silhouette scores for `k` in `k_min..k_max`.
    ///
    /// # Errors
    ///
    /// As [`ComputeClient::run_algorithm`]. Connection failures are retried
    /// once before being returned.
    pub async fn elbow_sweep(
        &self,
        customers: &[CustomerRecord],
        k_min: u32,
        k_max: u32,
    ) -> Result<ElbowCurve, ComputeError> {
        let body = ElbowRequest {
            customers,
            k_min,
            k_max,
        };
        let context = format!("elbow(k_min={k_min}, k_max={k_max})");
        let raw: RawElbowResponse = retry_with_backoff(READ_ONLY_RETRIES, self.retry_backoff_ms, || {
            self.post_json("elbow", &body, &context)
        })
        .await?;
        validate::validate_elbow_response(raw)
    }

    /// Predicts the cluster of one customer with the engine's trained model.
    ///
    /// # Errors
    ///
    /// As [`ComputeClient::run_algorithm`]; an engine without a trained model
    /// answers 404, surfaced as [`ComputeError::Status`].
    pub async fn predict_one(
        &self,
        customer: &CustomerRecord,
        algorithm: Algorithm,
    ) -> Result<Prediction, ComputeError> {
        let body = PredictRequest {
            customer,
            algorithm,
        };
        let raw: RawPrediction = self
            .post_json("predict", &body, &format!("predict(algorithm={algorithm})"))
            .await?;
        validate::validate_prediction(raw)
    }

    /// Fetches the engine's generated sample customer set.
    ///
    /// # Errors
    ///
    /// As [`ComputeClient::elbow_sweep`].
    pub async fn sample_data(&self) -> Result<Vec<CustomerRecord>, ComputeError> {
        let raw: SampleDataResponse = retry_with_backoff(READ_ONLY_RETRIES, self.retry_backoff_ms, || {
            self.get_json("sample-data", "sample-data")
        })
        .await?;
        Ok(raw.customers)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ComputeError> {
        self.base_url
            .join(path)
            .map_err(|e| ComputeError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, context: &str) -> Result<T, ComputeError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let request = self.client.post(url).json(body);
        self.send(request, context).await
    }

    async fn get_json<T>(&self, path: &str, context: &str) -> Result<T, ComputeError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let request = self.client.get(url);
        self.send(request, context).await
    }

    /// Sends the request, maps timeouts and non-2xx statuses, and parses the
    /// body as JSON.
    async fn send<T>(&self, request: reqwest::RequestBuilder, context: &str) -> Result<T, ComputeError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(ComputeError::Status {
                status: status.as_u16(),
                message: engine_error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ComputeError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ComputeError {
        if err.is_timeout() {
            ComputeError::Timeout(self.timeout)
        } else {
            ComputeError::Http(err)
        }
    }
}

/// The engine reports failures as `{"error": "..."}`; fall back to the raw
/// body (truncated) when it does not.
fn engine_error_message(body: &str) -> String {
    const MAX_LEN: usize = 500;
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(serde_json::Value::as_str) {
            return msg.to_owned();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error message".to_owned();
    }
    trimmed.chars().take(MAX_LEN).collect()
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
