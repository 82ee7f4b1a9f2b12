use bytes::Bytes;

use crate::error::FetchError;

/// Ordered urls submitted by one client request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlRequest {
    urls: Vec<String>,
}

impl UrlRequest {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

/// Result of fetching one url: either its payload or the cause of the failure.
#[derive(Debug)]
pub struct FetchOutcome {
    url: String,
    result: Result<Bytes, FetchError>,
}

impl FetchOutcome {
    pub fn new(url: String, result: Result<Bytes, FetchError>) -> Self {
        Self { url, result }
    }

    pub fn into_parts(self) -> (String, Result<Bytes, FetchError>) {
        (self.url, self.result)
    }
}

/// A successfully fetched url and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedUrl {
    pub url: String,
    pub payload: Bytes,
}

/// Aggregated result of a client request.
///
/// Partial success is never reported: a single failed fetch discards every payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateResult {
    /// Every url was fetched. Payloads are in completion order.
    Succeeded(Vec<FetchedUrl>),
    /// The first observed failure, as a message.
    Failed(String),
}

impl AggregateResult {
    /// Returns the failure message, or an empty string on success.
    pub fn error_message(&self) -> &str {
        match self {
            AggregateResult::Succeeded(_) => "",
            AggregateResult::Failed(message) => message,
        }
    }

    /// Returns the fetched urls, or `None` on failure.
    pub fn responses(&self) -> Option<&[FetchedUrl]> {
        match self {
            AggregateResult::Succeeded(responses) => Some(responses),
            AggregateResult::Failed(_) => None,
        }
    }
}

/// What the coordinator hands back for a client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The aggregate result to serialize for the client.
    Respond(AggregateResult),
    /// The client disconnected; nothing must be written back.
    Undeliverable,
}
