//! Listing-Ingest: a polite classified-listing ingestion worker
//!
//! This crate fetches real-estate listing pages (respecting robots.txt and
//! rotating through outbound proxies), extracts structured listing records
//! from their markup, and publishes each record to a durable AMQP queue.

pub mod config;
pub mod ingest;
pub mod model;
pub mod output;
pub mod proxy;
pub mod publish;
pub mod robots;
pub mod state;

use thiserror::Error;

/// Main error type for Listing-Ingest operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PassState,
        to: state::PassState,
    },

    #[error("Pass cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Errors produced while retrieving a page
///
/// Every variant carries the URL it was raised for so log lines and pass
/// summaries can be attributed without extra context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("URL disallowed by robots.txt: {url}")]
    Blocked { url: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    HttpError { url: String, status: u16 },

    #[error("Connection error for {url}: {message}")]
    ConnectionError { url: String, message: String },

    #[error("Failed to read content from {url}: {message}")]
    ContentFetchError { url: String, message: String },

    #[error("Fetch cancelled for {url}")]
    Cancelled { url: String },
}

impl FetchError {
    /// Returns true if another attempt may succeed
    ///
    /// Timeouts, connection failures, interrupted bodies, HTTP 429 and 5xx
    /// responses are retried. Every other status is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionError { .. } | Self::ContentFetchError { .. } => {
                true
            }
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            Self::Blocked { .. } | Self::Cancelled { .. } => false,
        }
    }

    /// Returns the HTTP status code, if the failure carried one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for Listing-Ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for page retrieval
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use ingest::{Fetcher, ListingExtractor, PageSource, StaticPage, WorkerLoop};
pub use model::Listing;
pub use output::PassSummary;
pub use proxy::{ProxyEndpoint, ProxyPool};
pub use robots::RobotsGate;
pub use state::{FailureReason, PassState};
