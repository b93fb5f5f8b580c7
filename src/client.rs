//! Request orchestrator.
//!
//! [`FuseClient`] is the per-call entry point: it resolves the endpoint's
//! breaker, runs the pre-call rejection check, stamps the request
//! correlation header, fills in default timeouts, and drives the transport
//! through the retry policy. Any successful completion force-closes the
//! breaker, including from half-open.

use std::collections::HashSet;
use std::sync::Arc;

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::Error;
use crate::metrics::RequestMetrics;
use crate::registry::{endpoint_key, BreakerRegistry};
use crate::retry::RetryPolicy;
use crate::transport::{
    OutboundRequest, ReqwestTransport, Timeouts, Transport, TransportResponse,
};

/// Correlation header stamped on every outbound request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request overrides. Everything unset falls back to the config
/// snapshot.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Attempt budget; 0 disables retry. Setting any positive value also
    /// opts the request's method into status-based retry.
    pub max_tries: Option<u32>,
    pub status_forcelist: Option<HashSet<StatusCode>>,
    pub backoff_factor: Option<f64>,
    pub timeout: Option<Timeouts>,
}

/// HTTP client wrapper adding retry and per-endpoint circuit breaking.
pub struct FuseClient {
    config: Config,
    registry: Arc<BreakerRegistry>,
    transport: Arc<dyn Transport>,
}

impl FuseClient {
    /// Build a client from the environment. Each call produces an
    /// independent client with its own breaker registry.
    pub fn init() -> Result<Self, Error> {
        Self::new(Config::from_env())
    }

    pub fn new(config: Config) -> Result<Self, Error> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Build a client over a custom transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let registry = Arc::new(BreakerRegistry::new(&config)?);
        Ok(Self {
            config,
            registry,
            transport,
        })
    }

    /// Build a client over a custom transport and clock. Intended for tests
    /// that drive time-based breaker transitions deterministically.
    pub fn with_transport_and_clock(
        config: Config,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let registry = Arc::new(BreakerRegistry::with_clock(&config, clock)?);
        Ok(Self {
            config,
            registry,
            transport,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Breaker registry backing this client (monitoring).
    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    pub async fn get(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        self.request(Method::GET, url, options).await
    }

    pub async fn head(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        self.request(Method::HEAD, url, options).await
    }

    pub async fn delete(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        self.request(Method::DELETE, url, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: impl Into<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        let url = parse_url(url)?;
        self.send(OutboundRequest::new(Method::POST, url).with_body(body), options)
            .await
    }

    pub async fn put(
        &self,
        url: &str,
        body: impl Into<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        let url = parse_url(url)?;
        self.send(OutboundRequest::new(Method::PUT, url).with_body(body), options)
            .await
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        let url = parse_url(url)?;
        self.send(OutboundRequest::new(method, url), options).await
    }

    /// Issue a fully specified request through the resilience layer.
    pub async fn send(
        &self,
        mut request: OutboundRequest,
        options: RequestOptions,
    ) -> Result<TransportResponse, Error> {
        let breaker = self.registry.get(&request.url);
        if breaker.is_open() {
            breaker.increment_rejected();
            warn!(url = %request.url, "rejecting request on open circuit");
            RequestMetrics::record(request.method.as_str(), "rejected");
            return Err(Error::OpenCircuit {
                endpoint: endpoint_key(&request.url),
            });
        }

        ensure_request_id(&mut request.headers);
        let timeouts = options
            .timeout
            .unwrap_or(Timeouts::new(self.config.connect_timeout, self.config.read_timeout));
        let policy = RetryPolicy::for_request(&self.config, &request.method, &options);

        info!(method = %request.method, url = %request.url, "dispatching request");
        let method = request.method.clone();
        let transport = Arc::clone(&self.transport);
        let result = policy
            .run(&method, &breaker, || {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move { transport.execute(request, timeouts).await }
            })
            .await;

        match result {
            Ok(response) => {
                breaker.close();
                RequestMetrics::record(method.as_str(), "success");
                Ok(response)
            }
            Err(err) => {
                RequestMetrics::record(method.as_str(), "failure");
                Err(err)
            }
        }
    }
}

fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|err| Error::InvalidUrl(format!("{url}: {err}")))
}

fn ensure_request_id(headers: &mut HeaderMap) {
    if headers.contains_key(REQUEST_ID_HEADER) {
        return;
    }
    let id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::TransportError;

    struct RecordingTransport {
        calls: AtomicU32,
        seen: Mutex<Vec<OutboundRequest>>,
        status: StatusCode,
    }

    impl RecordingTransport {
        fn new(status: StatusCode) -> Self {
            Self {
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
                status,
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn execute(
            &self,
            request: OutboundRequest,
            _timeouts: Timeouts,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request);
            Ok(TransportResponse {
                status: self.status,
                headers: HeaderMap::new(),
                body: b"ok".to_vec(),
            })
        }
    }

    fn client_with(transport: Arc<RecordingTransport>) -> FuseClient {
        FuseClient::with_transport(Config::default(), transport).unwrap()
    }

    #[tokio::test]
    async fn stamps_a_request_id_when_absent() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let client = client_with(transport.clone());

        client
            .get("http://api.example.com/v1/items", RequestOptions::default())
            .await
            .unwrap();

        let seen = transport.seen.lock();
        let id = seen[0]
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .unwrap();
        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn keeps_a_caller_supplied_request_id() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let client = client_with(transport.clone());

        let url = Url::parse("http://api.example.com/v1/items").unwrap();
        let mut request = OutboundRequest::new(Method::GET, url);
        request
            .headers
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static("caller-id"));

        client.send(request, RequestOptions::default()).await.unwrap();

        let seen = transport.seen.lock();
        assert_eq!(
            seen[0].headers.get(REQUEST_ID_HEADER).unwrap(),
            "caller-id"
        );
    }

    #[tokio::test]
    async fn invalid_url_is_reported_before_any_attempt() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let client = client_with(transport.clone());

        let result = client.get("not a url", RequestOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_retried_error_status_is_returned_to_the_caller() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::BAD_REQUEST));
        let client = client_with(transport.clone());

        let response = client
            .put("http://api.example.com/v1/items", "payload", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
