//! Error type definitions for the favicon service

use std::time::Duration;

use thiserror::Error;

/// Top-level application error type
///
/// Everything below the resolver is converted into "try the next fallback",
/// so in practice only [`AppError::MalformedUrl`] reaches an end user.
#[derive(Error, Debug)]
pub enum AppError {
    /// The target URL has no recognisable scheme or host
    #[error("Malformed URL: {url}")]
    MalformedUrl { url: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Cache backend errors surfaced outside the resolution path
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Local I/O failures (default icon, diagnostic pages)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures of a single bounded-time fetch
#[derive(Error, Debug)]
pub enum FetchError {
    /// The resolution deadline was exhausted before or during the fetch
    #[error("Timeout fetching {url} (budget {budget:?})")]
    Timeout { url: String, budget: Duration },

    /// The URL could not be turned into a request
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Connection, TLS, redirect or protocol failures
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The response body exceeded the configured limit
    #[error("Response body from {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },
}

/// Cache backend failures
#[derive(Error, Debug)]
pub enum CacheError {
    /// Socket level failures talking to a remote cache
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected or error replies from a remote cache
    #[error("Cache protocol error: {message}")]
    Protocol { message: String },

    /// Keys the backend cannot store
    #[error("Invalid cache key: {key}")]
    InvalidKey { key: String },

    /// The backend did not answer in time
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl AppError {
    /// Create a malformed URL error
    pub fn malformed_url<S: Into<String>>(url: S) -> Self {
        Self::MalformedUrl { url: url.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl FetchError {
    /// Create a network error for a URL
    pub fn network<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether this failure was caused by the resolution deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl CacheError {
    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
