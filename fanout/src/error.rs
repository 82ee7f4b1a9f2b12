//! Error types of the fan-out core.
//!
//! [`FetchError`] describes why a single url could not be fetched; its `Display` output is the
//! message reported to the client when it aborts a batch. [`CoordinatorError`] covers requests
//! rejected before any fetch starts.

use thiserror::Error;

/// Failure of a single url fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Failure reported by a [`crate::fetcher::Fetcher`] other than the HTTP one, passed to the
    /// client as is.
    #[error("{message}")]
    Other { url: String, message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    InvalidClient(#[source] reqwest::Error),
}

impl FetchError {
    /// Classifies a [`reqwest::Error`] raised while sending the request.
    pub fn from_send(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();

        if source.is_timeout() {
            FetchError::Timeout { url }
        } else if source.is_connect() {
            FetchError::Connect { url, source }
        } else {
            FetchError::Request { url, source }
        }
    }

    /// Classifies a [`reqwest::Error`] raised while reading the response body.
    pub fn from_body(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();

        // The client timeout also covers body reads.
        if source.is_timeout() {
            FetchError::Timeout { url }
        } else {
            FetchError::Body { url, source }
        }
    }
}

/// Reasons a client request is rejected before any fetch work starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Maximum allowed urls in one request is {max}")]
    TooManyUrls { count: usize, max: usize },
}
