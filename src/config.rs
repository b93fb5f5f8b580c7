//! Configuration snapshot.
//!
//! Loaded from environment variables once via [`Config::from_env`]; the
//! snapshot is immutable afterwards. Changing behavior means building a new
//! snapshot (and a new client). The variable names below are part of the
//! public contract, including the historical mix of `PYH_` and `PHY_`
//! prefixes.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `PYH_CONNECT_TIMEOUT` | connect timeout, seconds | 5 |
//! | `PYH_READ_TIMEOUT` | read timeout, seconds | 5 |
//! | `PHY_MAX_TRIES` | default attempt count | 3 |
//! | `PHY_BACKOFF_FACTOR` | backoff base, seconds | 0.5 |
//! | `PYH_CIRCUIT_FAIL_THRESHOLD` | failures before the circuit opens | 5 |
//! | `PYH_CIRCUIT_DELAY` | open duration before a probe, seconds | 5 |
//! | `PYH_CIRCUIT_ALIVE_THRESHOLD` | rejections that force a probe | 20 |
//! | `PHY_LOG` | log level for host subscribers | WARN |

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use http::{Method, StatusCode};
use tracing::Level;

use crate::circuit_breaker::BreakerConfig;
use crate::error::ErrorKind;

/// Immutable behavior snapshot shared by client, retry policy and breakers.
#[derive(Debug, Clone)]
pub struct Config {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Default total attempts per logical request.
    pub max_tries: u32,
    /// Exponential backoff base, in seconds.
    pub backoff_factor: f64,
    /// Methods retried by default.
    pub method_whitelist: HashSet<Method>,
    /// Statuses that force a retry on whitelisted methods.
    pub status_forcelist: HashSet<StatusCode>,
    /// Error kinds that participate in retry and breaker failure accounting.
    pub retriable_errors: Vec<ErrorKind>,
    pub cb_fail_threshold: u32,
    pub cb_delay: Duration,
    pub cb_alive_threshold: u32,
    /// Level hint from `PHY_LOG` for host applications; the library never
    /// installs a subscriber itself.
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            max_tries: 3,
            backoff_factor: 0.5,
            method_whitelist: HashSet::from([Method::HEAD, Method::GET]),
            status_forcelist: HashSet::from([StatusCode::INTERNAL_SERVER_ERROR]),
            retriable_errors: vec![ErrorKind::Transport],
            cb_fail_threshold: 5,
            cb_delay: Duration::from_secs(5),
            cb_alive_threshold: 20,
            log_level: Level::WARN,
        }
    }
}

impl Config {
    /// Load the snapshot from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: Duration::from_secs(parse_env_with_default("PYH_CONNECT_TIMEOUT", 5)),
            read_timeout: Duration::from_secs(parse_env_with_default("PYH_READ_TIMEOUT", 5)),
            max_tries: parse_env_with_default("PHY_MAX_TRIES", 3),
            backoff_factor: parse_env_with_default("PHY_BACKOFF_FACTOR", 0.5),
            cb_fail_threshold: parse_env_with_default("PYH_CIRCUIT_FAIL_THRESHOLD", 5),
            cb_delay: Duration::from_secs(parse_env_with_default("PYH_CIRCUIT_DELAY", 5)),
            cb_alive_threshold: parse_env_with_default("PYH_CIRCUIT_ALIVE_THRESHOLD", 20),
            log_level: parse_env_with_default("PHY_LOG", Level::WARN),
            ..Self::default()
        }
    }

    /// Breaker template derived from this snapshot. The retriable transport
    /// kinds double as the breakers' failure kinds.
    pub(crate) fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            allowed_fails: self.cb_fail_threshold,
            retry_time: self.cb_delay,
            rejected_threshold: self.cb_alive_threshold,
            allowed_kinds: Vec::new(),
            failure_kinds: self.retriable_errors.clone(),
        }
    }
}

fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_contract() {
        let config = Config::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.max_tries, 3);
        assert_eq!(config.backoff_factor, 0.5);
        assert!(config.method_whitelist.contains(&Method::GET));
        assert!(config.method_whitelist.contains(&Method::HEAD));
        assert!(!config.method_whitelist.contains(&Method::PUT));
        assert!(config
            .status_forcelist
            .contains(&StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(config.cb_fail_threshold, 5);
        assert_eq!(config.cb_delay, Duration::from_secs(5));
        assert_eq!(config.cb_alive_threshold, 20);
        assert_eq!(config.log_level, Level::WARN);
    }

    #[test]
    fn env_overrides_are_read() {
        std::env::set_var("PYH_CIRCUIT_FAIL_THRESHOLD", "9");
        std::env::set_var("PHY_BACKOFF_FACTOR", "0.25");
        let config = Config::from_env();
        assert_eq!(config.cb_fail_threshold, 9);
        assert_eq!(config.backoff_factor, 0.25);
        std::env::remove_var("PYH_CIRCUIT_FAIL_THRESHOLD");
        std::env::remove_var("PHY_BACKOFF_FACTOR");
    }

    #[test]
    fn unparseable_values_fall_back() {
        std::env::set_var("PYH_CIRCUIT_ALIVE_THRESHOLD", "twenty");
        let config = Config::from_env();
        assert_eq!(config.cb_alive_threshold, 20);
        std::env::remove_var("PYH_CIRCUIT_ALIVE_THRESHOLD");
    }

    #[test]
    fn breaker_template_mirrors_circuit_settings() {
        let config = Config {
            cb_fail_threshold: 7,
            cb_delay: Duration::from_secs(11),
            cb_alive_threshold: 13,
            ..Config::default()
        };
        let template = config.breaker_config();
        assert_eq!(template.allowed_fails, 7);
        assert_eq!(template.retry_time, Duration::from_secs(11));
        assert_eq!(template.rejected_threshold, 13);
        assert!(template.allowed_kinds.is_empty());
        assert_eq!(template.failure_kinds, vec![ErrorKind::Transport]);
    }
}
