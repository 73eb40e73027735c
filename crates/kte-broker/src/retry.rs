//! Exponential-backoff retry for transport errors (spec §4.2): 3 attempts,
//! delay = 1s · 2^n. Non-retryable errors (4xx-equivalent) return
//! immediately on the first failure.

use std::future::Future;
use std::time::Duration;

use crate::error::BrokerError;

pub const MAX_ATTEMPTS: u32 = 3;

pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = Duration::from_secs(1) * 2u32.pow(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "retrying broker request");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transport_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), BrokerError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BrokerError::Transport("boom".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_non_transport_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), BrokerError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BrokerError::Reject("bad qty".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(BrokerError::Transport("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
