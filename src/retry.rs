//! Bounded retry with exponential backoff, coupled to the circuit breaker.
//!
//! The loop owns two decisions per attempt: whether the outcome is
//! retriable, and whether the breaker still admits another attempt. Every
//! failed attempt is reported to the breaker via `mark_failure`; once the
//! breaker opens the loop aborts regardless of remaining budget.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use http::{Method, StatusCode};
use rand::Rng;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::client::RequestOptions;
use crate::config::Config;
use crate::error::{Error, ErrorClass, ErrorKind, LastAttempt, TransportError};
use crate::metrics::RetryMetrics;
use crate::transport::TransportResponse;

/// Effective retry settings for one logical request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed; 0 and 1 both mean a single attempt.
    pub max_tries: u32,
    /// Exponential backoff base, in seconds.
    pub backoff_factor: f64,
    pub status_forcelist: HashSet<StatusCode>,
    /// Methods whose forced statuses are retried. Includes the request's own
    /// method when the caller opted in with an explicit `max_tries`.
    pub method_whitelist: HashSet<Method>,
    pub retriable_kinds: Vec<ErrorKind>,
    /// Randomize each delay by ±30%. Off by default so backoff timing is
    /// exactly `backoff_factor × 2^(n-1)`.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Merge per-request options over the config snapshot.
    ///
    /// Passing `max_tries > 0` whitelists the request's method, which is the
    /// opt-in for retrying non-idempotent methods.
    pub fn for_request(config: &Config, method: &Method, options: &RequestOptions) -> Self {
        let mut method_whitelist = config.method_whitelist.clone();
        if matches!(options.max_tries, Some(tries) if tries > 0) {
            method_whitelist.insert(method.clone());
        }
        Self {
            max_tries: options.max_tries.unwrap_or(config.max_tries),
            backoff_factor: options.backoff_factor.unwrap_or(config.backoff_factor),
            status_forcelist: options
                .status_forcelist
                .clone()
                .unwrap_or_else(|| config.status_forcelist.clone()),
            method_whitelist,
            retriable_kinds: config.retriable_errors.clone(),
            jitter: false,
        }
    }

    /// Delay before attempt `attempt` (1-based index of the upcoming
    /// attempt, counting from the second one).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_factor * 2f64.powi(attempt as i32 - 1);
        let secs = if self.jitter {
            base * (1.0 + rand::thread_rng().gen_range(-0.3..0.3))
        } else {
            base
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn retries_status(&self, method: &Method, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status) && self.method_whitelist.contains(method)
    }

    fn retries_error(&self, err: &TransportError) -> bool {
        err.kind().matches_any(&self.retriable_kinds)
    }

    /// Drive `attempt` until it succeeds, the budget runs out, a
    /// non-retriable error surfaces, or the breaker opens.
    pub async fn run<F, Fut>(
        &self,
        method: &Method,
        breaker: &CircuitBreaker,
        mut attempt: F,
    ) -> Result<TransportResponse, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<TransportResponse, TransportError>>,
    {
        let budget = self.max_tries.max(1);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let last = match attempt().await {
                Ok(response) if !self.retries_status(method, response.status) => {
                    RetryMetrics::record_attempts("success", attempts);
                    return Ok(response);
                }
                Ok(response) => {
                    debug!(status = %response.status, attempts, "retriable status");
                    LastAttempt::Response(response)
                }
                Err(err) if self.retries_error(&err) => {
                    debug!(error = %err, attempts, "retriable transport error");
                    LastAttempt::Error(err)
                }
                Err(err) => {
                    RetryMetrics::record_attempts("non_retriable", attempts);
                    return Err(Error::Transport(err));
                }
            };

            breaker.mark_failure();
            if breaker.is_open() {
                warn!(attempts, "circuit opened during retry, aborting");
                RetryMetrics::record_attempts("circuit_open", attempts);
                return Err(Error::RetryExhausted { attempts, last });
            }
            if attempts >= budget {
                warn!(attempts, "retry budget exhausted");
                RetryMetrics::record_attempts("exhausted", attempts);
                return Err(Error::RetryExhausted { attempts, last });
            }
            tokio::time::sleep(self.backoff_delay(attempts)).await;
        }
    }
}
