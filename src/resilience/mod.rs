//! Resilience layer: rate limiting and backoff around provider calls.
//!
//! Every provider call in the crate goes through [`call_with_resilience`]:
//! the limiter is consulted first (a denial counts as a transient failure
//! and consumes an attempt), the call runs with the provider's own timeout,
//! and transient failures sleep a jittered exponential delay before the
//! next attempt. Non-transient failures are returned immediately — retrying
//! a malformed response or a bad API key never helps.

pub mod backoff;
pub mod rate_limit;

pub use backoff::BackoffPolicy;
pub use rate_limit::{RateLimiter, RateLimiterStats};

use crate::error::ProviderError;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Outcome of a resilient call that did not produce a value.
#[derive(Debug, Clone)]
pub enum ResilientCallError {
    /// A non-transient provider failure; surfaced after the first attempt.
    Provider(ProviderError),
    /// Every attempt failed transiently; the retry budget is spent.
    Exhausted {
        attempts: u32,
        last_error: ProviderError,
    },
}

/// Run `op` under the limiter and backoff policy.
///
/// `op` is invoked at most `policy.max_attempts` times. A limiter denial
/// is treated exactly like a provider rate-limit response: transient,
/// retried after backoff.
pub async fn call_with_resilience<T, F, Fut>(
    limiter: &Arc<RateLimiter>,
    policy: &BackoffPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ResilientCallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut last_transient: Option<ProviderError> = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.delay_for_attempt(attempt - 1);
            warn!(
                "{}: retry {}/{} after {:.1}s",
                label,
                attempt,
                policy.max_attempts - 1,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }

        if !limiter.acquire() {
            last_transient = Some(ProviderError::RateLimited {
                detail: "local limiter denied the request".into(),
            });
            continue;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!("{}: attempt {} failed transiently: {}", label, attempt + 1, e);
                last_transient = Some(e);
            }
            Err(e) => return Err(ResilientCallError::Provider(e)),
        }
    }

    Err(ResilientCallError::Exhausted {
        attempts: policy.max_attempts,
        last_error: last_transient.unwrap_or(ProviderError::RateLimited {
            detail: "no attempt was admitted".into(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            base_secs: 0.001,
            max_secs: 0.01,
            multiplier: 2.0,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let limiter = Arc::new(RateLimiter::new(100, 100));
        let calls = AtomicU32::new(0);

        let result = call_with_resilience(&limiter, &fast_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::RateLimited { detail: "429".into() })
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_short_circuit() {
        let limiter = Arc::new(RateLimiter::new(100, 100));
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> =
            call_with_resilience(&limiter, &fast_policy(5), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::MalformedResponse {
                        detail: "not json".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ResilientCallError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let limiter = Arc::new(RateLimiter::new(100, 100));

        let result: Result<u32, _> =
            call_with_resilience(&limiter, &fast_policy(3), "test", || async {
                Err(ProviderError::NetworkTimeout { secs: 30 })
            })
            .await;

        match result {
            Err(ResilientCallError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, ProviderError::NetworkTimeout { .. }));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn limiter_denial_counts_as_transient() {
        // Burst pool of 1: the first attempt is admitted and fails
        // transiently; subsequent attempts are denied locally.
        let limiter = Arc::new(RateLimiter::new(100, 1));

        let result: Result<u32, _> =
            call_with_resilience(&limiter, &fast_policy(3), "test", || async {
                Err(ProviderError::RateLimited { detail: "429".into() })
            })
            .await;

        match result {
            Err(ResilientCallError::Exhausted { last_error, .. }) => {
                assert!(matches!(last_error, ProviderError::RateLimited { .. }));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
    }
}
