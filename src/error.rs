//! Error types shared across the crate.
//!
//! Transport failures carry a tagged [`ErrorKind`] so that retry and breaker
//! policies can match on error families instead of concrete types. The
//! `Transport` kind is an umbrella: `Connect`, `Dns`, `ConnectTimeout` and
//! `ReadTimeout` all match a policy that lists `Transport`.

use std::fmt;

use thiserror::Error;

use crate::transport::TransportResponse;

/// Classification tag for failures observed on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Umbrella for all transport-level failures.
    Transport,
    /// Connection refused or reset before a response arrived.
    Connect,
    /// Name resolution failed.
    Dns,
    /// The connect phase exceeded its deadline.
    ConnectTimeout,
    /// The response did not arrive within the read deadline.
    ReadTimeout,
    /// Anything the transport could not classify further.
    Other,
}

impl ErrorKind {
    /// Family this kind belongs to, if any.
    pub fn family(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Connect
            | ErrorKind::Dns
            | ErrorKind::ConnectTimeout
            | ErrorKind::ReadTimeout => Some(ErrorKind::Transport),
            ErrorKind::Transport | ErrorKind::Other => None,
        }
    }

    /// True when `self` is `other` or a member of the `other` family.
    pub fn matches(self, other: ErrorKind) -> bool {
        self == other || self.family() == Some(other)
    }

    pub fn matches_any(self, kinds: &[ErrorKind]) -> bool {
        kinds.iter().any(|kind| self.matches(*kind))
    }
}

/// Implemented by error types the circuit breaker can classify.
pub trait ErrorClass {
    fn kind(&self) -> ErrorKind;
}

/// Failure reported by a [`Transport`](crate::transport::Transport)
/// implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("dns resolution failed: {0}")]
    Dns(String),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("read timed out")]
    ReadTimeout,
    #[error("transport failure: {0}")]
    Other(String),
}

impl ErrorClass for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Connect(_) => ErrorKind::Connect,
            TransportError::Dns(_) => ErrorKind::Dns,
            TransportError::ConnectTimeout => ErrorKind::ConnectTimeout,
            TransportError::ReadTimeout => ErrorKind::ReadTimeout,
            TransportError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Final outcome of the last attempt a retry cycle made.
#[derive(Debug)]
pub enum LastAttempt {
    Error(TransportError),
    Response(TransportResponse),
}

impl fmt::Display for LastAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastAttempt::Error(err) => write!(f, "{err}"),
            LastAttempt::Response(response) => write!(f, "status {}", response.status),
        }
    }
}

/// Invalid breaker or registry construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("allowed_kinds and failure_kinds cannot both be set")]
    ConflictingKinds,
    #[error("{0} must be greater than zero")]
    ZeroThreshold(&'static str),
}

/// Errors surfaced by [`FuseClient`](crate::client::FuseClient).
#[derive(Debug, Error)]
pub enum Error {
    /// The breaker rejected the request before any network I/O.
    #[error("open circuit for {endpoint}")]
    OpenCircuit { endpoint: String },

    /// The attempt budget ran out, or the breaker opened mid-retry.
    #[error("retry budget exhausted after {attempts} attempt(s): {last}")]
    RetryExhausted { attempts: u32, last: LastAttempt },

    /// Non-retriable transport failure, propagated unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
