//! Uniform call wrapper for external collaborators.
//!
//! Every discovery, enrichment, scoring and CRM call goes through
//! [`UpstreamGuard::call`]: a per-attempt timeout, bounded exponential retries
//! for retryable failures, and a per-collaborator circuit breaker.

use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamBreaker};
use crate::config::Config;
use failsafe::futures::CircuitBreaker;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Classified failure of an external call.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// The call did not complete within the per-attempt timeout.
    Timeout(String),
    /// Transient failure (connection error, 5xx, 429); worth retrying.
    Retryable(String),
    /// Permanent failure (4xx, malformed payload); retrying will not help.
    Fatal(String),
    /// The collaborator's circuit breaker is open.
    CircuitOpen(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_) | UpstreamError::Retryable(_))
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{} returned {}: {}", service, status, body);
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            UpstreamError::Retryable(message)
        } else {
            UpstreamError::Fatal(message)
        }
    }

    /// Classifies a transport-level `reqwest` failure.
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(format!("{} request timed out: {}", service, err))
        } else if err.is_connect() || err.is_request() {
            UpstreamError::Retryable(format!("{} request failed: {}", service, err))
        } else if err.is_decode() {
            UpstreamError::Fatal(format!("Failed to parse {} response: {}", service, err))
        } else {
            UpstreamError::Retryable(format!("{} request failed: {}", service, err))
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Timeout(msg) => write!(f, "timeout: {}", msg),
            UpstreamError::Retryable(msg) => write!(f, "retryable: {}", msg),
            UpstreamError::Fatal(msg) => write!(f, "fatal: {}", msg),
            UpstreamError::CircuitOpen(service) => write!(f, "circuit open for {}", service),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Timeout and retry budget for one collaborator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.upstream_timeout(),
            max_attempts: config.upstream_max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Named timeout/retry/breaker bundle for one collaborator.
#[derive(Clone)]
pub struct UpstreamGuard {
    service: String,
    policy: RetryPolicy,
    breaker: UpstreamBreaker,
}

impl UpstreamGuard {
    pub fn new(service: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            service: service.into(),
            policy,
            breaker: create_upstream_circuit_breaker(),
        }
    }

    /// Runs `op` under the guard's timeout, retry and breaker policy.
    ///
    /// `op` is invoked once per attempt. Only retryable failures are retried and
    /// only they count against the breaker.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let timeout = self.policy.timeout;
            let service = self.service.clone();
            let attempt_future = op();
            let guarded = async move {
                match tokio::time::timeout(timeout, attempt_future).await {
                    Ok(result) => result,
                    Err(_) => Err(UpstreamError::Timeout(format!(
                        "{} did not respond within {:?}",
                        service, timeout
                    ))),
                }
            };

            let outcome = self
                .breaker
                .call_with(|e: &UpstreamError| e.is_retryable(), guarded)
                .await;

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(failsafe::Error::Rejected) => {
                    tracing::warn!("Circuit open for {}, failing fast", self.service);
                    return Err(UpstreamError::CircuitOpen(self.service.clone()));
                }
                Err(failsafe::Error::Inner(e)) => e,
            };

            if !err.is_retryable() || attempt >= self.policy.max_attempts {
                tracing::warn!(
                    "{} call failed after {} attempt(s): {}",
                    self.service,
                    attempt,
                    err
                );
                return Err(err);
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::debug!(
                "{} attempt {} failed ({}), retrying in {:?}",
                self.service,
                attempt,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried_until_success() {
        let guard = UpstreamGuard::new("scoring", fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = guard
            .call(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(UpstreamError::Retryable("503".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let guard = UpstreamGuard::new("crm", fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = guard
            .call(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(UpstreamError::Fatal("400 bad request".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let guard = UpstreamGuard::new("source_a", fast_policy(1));

        let result: Result<(), _> = guard
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(300));
    }

    #[test]
    fn test_status_classification() {
        let err = UpstreamError::from_status("crm", reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(err.is_retryable());
        let err = UpstreamError::from_status("crm", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_retryable());
        let err = UpstreamError::from_status("crm", reqwest::StatusCode::UNPROCESSABLE_ENTITY, "");
        assert!(!err.is_retryable());
    }
}
