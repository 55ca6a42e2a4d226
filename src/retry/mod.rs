//! Retry wrapper for idempotent, not-yet-streaming operations.
//!
//! Two entry points:
//! - [`with_retry`] for plain async operations (provider calls, poll ticks),
//! - [`with_retry_stream`] for streaming connections, where only the initial
//!   handshake is retried. Once bytes have reached the caller a retry would
//!   duplicate output, which is forbidden, so mid-stream failures propagate.

mod policy;

pub use policy::RetryPolicy;

use std::future::Future;

use futures::Stream;
use tokio::time::sleep;

use crate::error::GeminiError;

/// Execute `operation` with retry-with-backoff.
///
/// Total attempts = `policy.max_retries + 1`. Retries only when the policy's
/// condition holds; otherwise (or when attempts run out) the most recent
/// error is returned.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, GeminiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeminiError>>,
{
    let mut last_error: Option<GeminiError> = None;

    for attempt in 0..=policy.max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !policy.should_retry(&error) {
                    return Err(error);
                }
                if attempt == policy.max_retries {
                    last_error = Some(error);
                    break;
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after retryable failure"
                );
                last_error = Some(error);
                sleep(delay).await;
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| GeminiError::Generic("retry loop exited without an error".into())))
}

/// Retry only the connection attempt of a streaming operation.
///
/// `connect` must produce the stream without delivering any payload as a
/// side effect; once it returns `Ok`, the stream is handed to the caller
/// as-is and is never re-established by this layer.
pub async fn with_retry_stream<F, Fut, S>(
    policy: &RetryPolicy,
    mut connect: F,
) -> Result<S, GeminiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, GeminiError>>,
    S: Stream,
{
    with_retry(policy, || connect()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use futures_util::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn retryable() -> GeminiError {
        GeminiError::Network("connection reset".into())
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }

    #[tokio::test]
    async fn succeeds_after_k_failures_with_k_plus_one_attempts() {
        for k in 0..=2u32 {
            let attempts = Arc::new(AtomicU32::new(0));
            let attempts_clone = attempts.clone();
            let result = with_retry(&fast_policy(), || {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < k { Err(retryable()) } else { Ok(n) }
                }
            })
            .await;
            assert_eq!(result.unwrap(), k);
            assert_eq!(attempts.load(Ordering::SeqCst), k + 1);
        }
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), _> = with_retry(&fast_policy(), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GeminiError::Validation("bad".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), _> = with_retry(&fast_policy(), || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Err(GeminiError::Network(format!("attempt {n}")))
            }
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("attempt 2"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stream_connect_is_retried_but_stream_is_not() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let s = with_retry_stream(&fast_policy(), || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(retryable())
                } else {
                    Ok(stream::iter(vec![1u32, 2, 3]))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let items: Vec<_> = s.collect().await;
        assert_eq!(items, vec![1, 2, 3]);
    }
}
