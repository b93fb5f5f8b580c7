//! Per-endpoint circuit breaker.
//!
//! State transitions:
//! - Closed → Open: `allowed_fails` consecutive failures
//! - Open → HalfOpen: `retry_time` elapsed, or `rejected_threshold` requests
//!   rejected while open
//! - HalfOpen → Closed: probe succeeds
//! - HalfOpen → Open: probe fails

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ErrorClass, ErrorKind};
use crate::metrics::CircuitBreakerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    Closed,
    /// Requests fail fast without touching the network.
    Open,
    /// One probe request is admitted to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Construction parameters for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures tolerated before the circuit opens.
    pub allowed_fails: u32,
    /// How long the circuit stays open before a probe is admitted.
    pub retry_time: Duration,
    /// Rejections while open that force a probe regardless of `retry_time`.
    pub rejected_threshold: u32,
    /// Error kinds that count neither as success nor as failure.
    /// Mutually exclusive with `failure_kinds`.
    pub allowed_kinds: Vec<ErrorKind>,
    /// When non-empty, only these error kinds count as failures; any other
    /// kind counts neither way. Mutually exclusive with `allowed_kinds`.
    pub failure_kinds: Vec<ErrorKind>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            allowed_fails: 5,
            retry_time: Duration::from_secs(5),
            rejected_threshold: 20,
            allowed_kinds: Vec::new(),
            failure_kinds: Vec::new(),
        }
    }
}

impl BreakerConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.allowed_kinds.is_empty() && !self.failure_kinds.is_empty() {
            return Err(ConfigError::ConflictingKinds);
        }
        if self.allowed_fails == 0 {
            return Err(ConfigError::ZeroThreshold("allowed_fails"));
        }
        if self.rejected_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("rejected_threshold"));
        }
        Ok(())
    }
}

/// Error returned by [`CircuitBreaker::guarded_call`].
#[derive(Debug, Error)]
pub enum GuardError<E> {
    #[error("open circuit, request rejected")]
    Open,
    #[error("{0}")]
    Inner(E),
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    rejected_count: u32,
    half_open_at: Option<Instant>,
}

type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Three-state circuit breaker guarding one endpoint.
///
/// The type parameter is the value produced by guarded operations; it only
/// matters when a result validator is attached.
pub struct CircuitBreaker<T = ()> {
    config: BreakerConfig,
    validator: Option<Validator<T>>,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl<T> CircuitBreaker<T> {
    pub fn new(config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config, Arc::new(SystemClock)))
    }

    pub(crate) fn from_validated(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            validator: None,
            clock,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                rejected_count: 0,
                half_open_at: None,
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a predicate that decides whether a produced value counts as a
    /// success. A value failing the predicate is recorded as a failure but
    /// still returned to the caller.
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Current state, refreshing an expired open circuit first.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        state.state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Consecutive failures observed so far (monitoring).
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Rejections observed since the circuit last opened (monitoring).
    pub fn rejected_count(&self) -> u32 {
        self.state.lock().rejected_count
    }

    /// Record a failure from outside a guarded call.
    ///
    /// The retry loop uses this between attempts. On an already-open circuit
    /// it only bumps the failure counter.
    pub fn mark_failure(&self) {
        let mut state = self.state.lock();
        self.on_failure(&mut state);
    }

    /// Record a rejection observed by a caller that saw the circuit open.
    pub fn increment_rejected(&self) {
        let mut state = self.state.lock();
        state.rejected_count += 1;
        CircuitBreakerMetrics::record_rejection();
    }

    /// Force the circuit closed. No-op when already closed.
    pub fn close(&self) {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        if state.state != CircuitState::Closed {
            self.transition_closed(&mut state);
        }
    }

    /// Run `operation` under the breaker.
    ///
    /// Rejects with [`GuardError::Open`] (counting the rejection) when the
    /// circuit is open. Otherwise the outcome is classified: `Ok(Some(v))`
    /// for a produced value, `Ok(None)` when an allowed error kind was
    /// swallowed, `Err(GuardError::Inner(e))` for everything rethrown.
    ///
    /// The internal lock is released while `operation` is in flight; the
    /// outcome is attributed to this call when it completes.
    pub async fn guarded_call<F, Fut, E>(&self, operation: F) -> Result<Option<T>, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClass,
    {
        {
            let mut state = self.state.lock();
            self.refresh(&mut state);
            if state.state == CircuitState::Open {
                state.rejected_count += 1;
                CircuitBreakerMetrics::record_rejection();
                return Err(GuardError::Open);
            }
        }

        match operation().await {
            Ok(value) => {
                let mut state = self.state.lock();
                match &self.validator {
                    Some(validator) if !validator(&value) => self.on_failure(&mut state),
                    _ => self.on_success(&mut state),
                }
                Ok(Some(value))
            }
            Err(err) => {
                let kind = err.kind();
                let mut state = self.state.lock();
                if !self.config.allowed_kinds.is_empty()
                    && kind.matches_any(&self.config.allowed_kinds)
                {
                    debug!(kind = ?kind, "allowed error kind, circuit unchanged");
                    return Ok(None);
                }
                if !self.config.failure_kinds.is_empty() {
                    if kind.matches_any(&self.config.failure_kinds) {
                        self.on_failure(&mut state);
                    }
                    return Err(GuardError::Inner(err));
                }
                self.on_failure(&mut state);
                Err(GuardError::Inner(err))
            }
        }
    }

    /// Elevate an open circuit to half-open once its deadline has passed or
    /// enough rejections piled up.
    fn refresh(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let deadline_passed = state
            .half_open_at
            .map_or(true, |at| self.clock.now() >= at);
        if deadline_passed || state.rejected_count >= self.config.rejected_threshold {
            info!("circuit half-open, admitting probe");
            CircuitBreakerMetrics::record_state_transition(
                CircuitState::Open.as_str(),
                CircuitState::HalfOpen.as_str(),
            );
            state.state = CircuitState::HalfOpen;
        }
    }

    fn on_success(&self, state: &mut BreakerState) {
        self.transition_closed(state);
    }

    fn on_failure(&self, state: &mut BreakerState) {
        state.failure_count += 1;
        debug!(failures = state.failure_count, "failure recorded");
        if state.failure_count >= self.config.allowed_fails {
            self.refresh(state);
            if state.state != CircuitState::Open {
                self.transition_open(state);
            }
        }
    }

    fn transition_open(&self, state: &mut BreakerState) {
        warn!(
            from = state.state.as_str(),
            failures = state.failure_count,
            "circuit opened"
        );
        CircuitBreakerMetrics::record_state_transition(
            state.state.as_str(),
            CircuitState::Open.as_str(),
        );
        state.state = CircuitState::Open;
        state.half_open_at = Some(self.clock.now() + self.config.retry_time);
        state.rejected_count = 0;
    }

    fn transition_closed(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Closed {
            info!(from = state.state.as_str(), "circuit closed");
            CircuitBreakerMetrics::record_state_transition(
                state.state.as_str(),
                CircuitState::Closed.as_str(),
            );
        }
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.rejected_count = 0;
        state.half_open_at = None;
    }
}
