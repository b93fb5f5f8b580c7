//! Pre-tuned configuration bundles for common downstream profiles.

use std::time::Duration;

use crate::config::Config;

/// First-party services on the same network.
///
/// - Tight connect timeout, moderate read timeout
/// - Quick backoff; transient blips resolve fast
/// - Default breaker thresholds
pub fn internal_service() -> Config {
    Config {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        max_tries: 3,
        backoff_factor: 0.2,
        ..Config::default()
    }
}

/// Third-party APIs over the public internet.
///
/// - Generous read timeout; external services can be slow
/// - More attempts with a longer backoff base
/// - Longer open period before probing again
pub fn external_api() -> Config {
    Config {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(30),
        max_tries: 5,
        backoff_factor: 0.5,
        cb_delay: Duration::from_secs(30),
        cb_alive_threshold: 50,
        ..Config::default()
    }
}

/// Upstreams known to drop requests under load.
///
/// - Aggressive retry with a short backoff base
/// - Higher failure tolerance before opening
/// - Short open period so recovery is noticed quickly
pub fn flaky_upstream() -> Config {
    Config {
        max_tries: 5,
        backoff_factor: 0.1,
        cb_fail_threshold: 10,
        cb_delay: Duration::from_secs(2),
        cb_alive_threshold: 10,
        ..Config::default()
    }
}
