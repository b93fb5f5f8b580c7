//! Client-side resilience for outbound HTTP calls.
//!
//! Wraps any HTTP request with two cooperating protections:
//! - **Bounded retry** with exponential backoff for transient failures
//! - **Per-endpoint circuit breaker** that fails fast while a downstream
//!   looks unhealthy
//!
//! Requests flow through [`FuseClient`]; every call is routed through a
//! retry policy and a breaker keyed on scheme + host + path of the target,
//! so different query strings share one breaker. Behavior comes from an
//! immutable [`Config`] snapshot loaded from `PYH_*`/`PHY_*` environment
//! variables or built in code.
//!
//! # Example: wrapped GET with defaults
//!
//! ```rust,no_run
//! use httpfuse::{FuseClient, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), httpfuse::Error> {
//!     let client = FuseClient::init()?;
//!     let response = client
//!         .get("http://orders.internal/v1/health", RequestOptions::default())
//!         .await?;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! # Example: standalone breaker around any operation
//!
//! ```rust,no_run
//! use httpfuse::{BreakerConfig, CircuitBreaker, TransportError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let breaker: CircuitBreaker = CircuitBreaker::new(BreakerConfig::default()).unwrap();
//!
//!     let outcome = breaker
//!         .guarded_call(|| async {
//!             // any fallible call here
//!             Ok::<_, TransportError>(())
//!         })
//!         .await;
//!     let _ = outcome;
//! }
//! ```

pub mod circuit_breaker;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod presets;
pub mod registry;
pub mod retry;
pub mod transport;

// Re-export main types for convenience
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState, GuardError};
pub use client::{FuseClient, RequestOptions, REQUEST_ID_HEADER};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{ConfigError, Error, ErrorClass, ErrorKind, LastAttempt, TransportError};
pub use registry::{endpoint_key, BreakerRegistry};
pub use retry::RetryPolicy;
pub use transport::{
    OutboundRequest, ReqwestTransport, Timeouts, Transport, TransportResponse,
};
