use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// Status codes worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Flat classification of everything that can go wrong while talking to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    HttpStatus(u16),
    Network,
    Configuration,
    UnparseableResponse,
    /// A fixed-station provider was asked about a location it does not serve.
    OutOfCoverage,
    /// The adapter task died before producing a result.
    Internal,
}

impl ErrorKind {
    /// Whether the retrying client should try again after this failure.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Timeout | ErrorKind::Network => true,
            ErrorKind::HttpStatus(code) => RETRYABLE_STATUSES.contains(&code),
            ErrorKind::Configuration
            | ErrorKind::UnparseableResponse
            | ErrorKind::OutOfCoverage
            | ErrorKind::Internal => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            ErrorKind::Network => f.write_str("network error"),
            ErrorKind::Configuration => f.write_str("configuration error"),
            ErrorKind::UnparseableResponse => f.write_str("unparseable response"),
            ErrorKind::OutOfCoverage => f.write_str("out of coverage"),
            ErrorKind::Internal => f.write_str("internal error"),
        }
    }
}

/// Terminal failure of a single provider request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn unparseable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnparseableResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_decode() {
            ErrorKind::UnparseableResponse
        } else if let Some(status) = err.status() {
            ErrorKind::HttpStatus(status.as_u16())
        } else {
            ErrorKind::Network
        };
        Self::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::unparseable(err.to_string())
    }
}

/// Errors the core raises to its own callers.
///
/// Provider failures never show up here; the aggregator folds them into
/// per-provider outcomes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no weather providers are enabled")]
    NoProviders,

    #[error("provider '{0}' is registered more than once")]
    DuplicateProvider(ProviderId),

    #[error("configuration error: {0}")]
    Configuration(String),
}
