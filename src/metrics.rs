//! Prometheus metrics, behind the `metrics` feature.
//!
//! Call sites always go through the facade structs below; without the
//! feature they compile to no-ops.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

#[cfg(feature = "metrics")]
static CIRCUIT_STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "httpfuse_circuit_state_transitions_total",
        "Total number of circuit breaker state transitions",
        &["from", "to"]
    )
    .expect("Failed to register circuit state transitions metric")
});

#[cfg(feature = "metrics")]
static CIRCUIT_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "httpfuse_circuit_rejections_total",
        "Requests rejected by an open circuit"
    )
    .expect("Failed to register circuit rejections metric")
});

#[cfg(feature = "metrics")]
static RETRY_ATTEMPTS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "httpfuse_retry_attempts",
        "Transport attempts made before a retry cycle ended",
        &["result"]
    )
    .expect("Failed to register retry attempts metric")
});

#[cfg(feature = "metrics")]
static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "httpfuse_requests_total",
        "Requests issued through the client",
        &["method", "outcome"]
    )
    .expect("Failed to register requests metric")
});

/// Metrics collector for the circuit breaker.
#[cfg(feature = "metrics")]
pub struct CircuitBreakerMetrics;

#[cfg(feature = "metrics")]
impl CircuitBreakerMetrics {
    pub fn record_state_transition(from: &str, to: &str) {
        CIRCUIT_STATE_TRANSITIONS
            .with_label_values(&[from, to])
            .inc();
    }

    pub fn record_rejection() {
        CIRCUIT_REJECTIONS.inc();
    }
}

/// Metrics collector for retry cycles.
#[cfg(feature = "metrics")]
pub struct RetryMetrics;

#[cfg(feature = "metrics")]
impl RetryMetrics {
    pub fn record_attempts(result: &str, attempts: u32) {
        RETRY_ATTEMPTS
            .with_label_values(&[result])
            .observe(attempts as f64);
    }
}

/// Metrics collector for client requests.
#[cfg(feature = "metrics")]
pub struct RequestMetrics;

#[cfg(feature = "metrics")]
impl RequestMetrics {
    pub fn record(method: &str, outcome: &str) {
        REQUESTS.with_label_values(&[method, outcome]).inc();
    }
}

// No-op implementations when the metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub struct CircuitBreakerMetrics;

#[cfg(not(feature = "metrics"))]
impl CircuitBreakerMetrics {
    pub fn record_state_transition(_from: &str, _to: &str) {}
    pub fn record_rejection() {}
}

#[cfg(not(feature = "metrics"))]
pub struct RetryMetrics;

#[cfg(not(feature = "metrics"))]
impl RetryMetrics {
    pub fn record_attempts(_result: &str, _attempts: u32) {}
}

#[cfg(not(feature = "metrics"))]
pub struct RequestMetrics;

#[cfg(not(feature = "metrics"))]
impl RequestMetrics {
    pub fn record(_method: &str, _outcome: &str) {}
}
