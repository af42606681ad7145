//! Retry with jittered back-off for the idempotent compute engine calls.
//!
//! Only connection-level failures are retried. A request that reached the
//! engine (timeout, error status, malformed body) is never replayed.

use std::future::Future;
use std::time::Duration;

use crate::error::ComputeError;

/// Returns `true` when the request never reached the engine.
pub(crate) fn is_retriable(err: &ComputeError) -> bool {
    match err {
        ComputeError::Http(e) => e.is_connect() && !e.is_timeout(),
        ComputeError::Timeout(_)
        | ComputeError::Status { .. }
        | ComputeError::Deserialize { .. }
        | ComputeError::ContractViolation(_)
        | ComputeError::InvalidBaseUrl { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// connection failures.
///
/// The delay before attempt `n + 1` is `backoff_base_ms × 2ⁿ⁻¹ ± 25 %`,
/// capped at 30 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ComputeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ComputeError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "compute engine unreachable, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    async fn connect_error() -> ComputeError {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1")
            .send()
            .await
            .unwrap_err();
        ComputeError::Http(err)
    }

    #[test]
    fn status_errors_are_not_retriable() {
        assert!(!is_retriable(&ComputeError::Status {
            status: 503,
            message: "busy".to_owned()
        }));
    }

    #[test]
    fn timeouts_are_not_retriable() {
        assert!(!is_retriable(&ComputeError::Timeout(Duration::from_secs(1))));
    }

    #[test]
    fn contract_violations_are_not_retriable() {
        assert!(!is_retriable(&ComputeError::ContractViolation(
            "missing metrics".to_owned()
        )));
    }

    #[tokio::test]
    async fn connection_refused_is_retriable() {
        assert!(is_retriable(&connect_error().await));
    }

    #[tokio::test]
    async fn retries_connection_failure_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(1, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(connect_error().await)
            }
        })
        .await;

        assert!(matches!(result, Err(ComputeError::Http(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one attempt plus one retry");
    }

    #[tokio::test]
    async fn recovers_when_retry_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(1, 0, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(connect_error().await)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_status_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(1, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ComputeError::Status {
                    status: 500,
                    message: "boom".to_owned(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ComputeError::Status { status: 500, .. })));
    }
}
