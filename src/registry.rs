//! Process-wide map from endpoint key to circuit breaker.
//!
//! Breakers are created lazily on first use and live for the registry's
//! lifetime; there is no eviction. The endpoint key concatenates scheme,
//! host (with port when explicit) and path, so the same endpoint called
//! with different query strings shares one breaker.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use url::Url;

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::ConfigError;

/// Registry key for `url`: scheme, host (with port when explicit) and path
/// concatenated.
///
/// Query string and fragment are excluded on purpose.
pub fn endpoint_key(url: &Url) -> String {
    let mut key = String::from(url.scheme());
    if let Some(host) = url.host_str() {
        key.push_str(host);
    }
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(url.path());
    key
}

/// Lazily populated endpoint → breaker map.
pub struct BreakerRegistry {
    template: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let template = config.breaker_config();
        template.validate()?;
        Ok(Self {
            template,
            clock,
            breakers: Mutex::new(HashMap::new()),
        })
    }

    /// Breaker for `url`, created from the config snapshot on first use.
    pub fn get(&self, url: &Url) -> Arc<CircuitBreaker> {
        let key = endpoint_key(url);
        let mut breakers = self.breakers.lock();
        Arc::clone(breakers.entry(key).or_insert_with_key(|key| {
            info!(endpoint = %key, "creating circuit breaker");
            Arc::new(CircuitBreaker::from_validated(
                self.template.clone(),
                Arc::clone(&self.clock),
            ))
        }))
    }

    /// Number of distinct endpoints seen so far.
    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn key_excludes_query_and_fragment() {
        assert_eq!(
            endpoint_key(&parse("http://api.example.com/v1/items?page=2#top")),
            "httpapi.example.com/v1/items"
        );
    }

    #[test]
    fn key_includes_explicit_port() {
        assert_eq!(
            endpoint_key(&parse("https://api.example.com:8443/health")),
            "httpsapi.example.com:8443/health"
        );
    }

    #[test]
    fn same_endpoint_shares_a_breaker() {
        let registry = BreakerRegistry::new(&Config::default()).unwrap();

        let a = registry.get(&parse("http://api.example.com/v1/items?page=1"));
        let b = registry.get(&parse("http://api.example.com/v1/items?page=2"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_paths_get_distinct_breakers() {
        let registry = BreakerRegistry::new(&Config::default()).unwrap();

        let a = registry.get(&parse("http://api.example.com/v1/items"));
        let b = registry.get(&parse("http://api.example.com/v1/orders"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn invalid_thresholds_fail_construction() {
        let config = Config {
            cb_fail_threshold: 0,
            ..Config::default()
        };
        assert!(BreakerRegistry::new(&config).is_err());
    }
}
