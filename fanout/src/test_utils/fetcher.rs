use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::fetcher::Fetcher;

#[derive(Debug, Clone)]
enum MockResponse {
    Payload(Bytes),
    Timeout,
    Failure(String),
}

#[derive(Debug, Default)]
struct FetchStats {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    completed: AtomicUsize,
}

/// Decrements the active counter even when the fetch future is dropped mid-flight.
struct ActiveFetch<'a>(&'a FetchStats);

impl<'a> ActiveFetch<'a> {
    fn enter(stats: &'a FetchStats) -> Self {
        stats.calls.fetch_add(1, Ordering::SeqCst);
        let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_active.fetch_max(active, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for ActiveFetch<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct MockFetcherInner {
    responses: HashMap<String, MockResponse>,
    url_latency: HashMap<String, Duration>,
    latency: Duration,
    stats: FetchStats,
}

/// [`Fetcher`] returning canned payloads and failures while counting calls.
///
/// Urls without a canned response echo the url itself as payload. Clones share the canned
/// responses and the counters.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    inner: Arc<MockFetcherInner>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut MockFetcherInner {
        Arc::get_mut(&mut self.inner).expect("mock fetcher must be configured before it is shared")
    }

    /// Answers `url` with `payload`.
    pub fn with_payload(mut self, url: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.inner_mut()
            .responses
            .insert(url.into(), MockResponse::Payload(payload.into()));
        self
    }

    /// Fails `url` with [`FetchError::Timeout`].
    pub fn with_timeout(mut self, url: impl Into<String>) -> Self {
        self.inner_mut()
            .responses
            .insert(url.into(), MockResponse::Timeout);
        self
    }

    /// Fails `url` with [`FetchError::Other`] carrying exactly `message`.
    pub fn with_failure(mut self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.inner_mut()
            .responses
            .insert(url.into(), MockResponse::Failure(message.into()));
        self
    }

    /// Delays every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.inner_mut().latency = latency;
        self
    }

    /// Delays fetches of `url` by `latency`, overriding [`MockFetcher::with_latency`].
    pub fn with_url_latency(mut self, url: impl Into<String>, latency: Duration) -> Self {
        self.inner_mut().url_latency.insert(url.into(), latency);
        self
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.inner.stats.calls.load(Ordering::SeqCst)
    }

    /// Number of fetches currently in flight.
    pub fn active(&self) -> usize {
        self.inner.stats.active.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed in flight at once.
    pub fn peak_active(&self) -> usize {
        self.inner.stats.peak_active.load(Ordering::SeqCst)
    }

    /// Number of fetches that ran to completion.
    pub fn completed(&self) -> usize {
        self.inner.stats.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let inner = &self.inner;
        let _active = ActiveFetch::enter(&inner.stats);

        let latency = inner.url_latency.get(url).copied().unwrap_or(inner.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = match inner.responses.get(url) {
            Some(MockResponse::Payload(payload)) => Ok(payload.clone()),
            Some(MockResponse::Timeout) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
            Some(MockResponse::Failure(message)) => Err(FetchError::Other {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Ok(Bytes::copy_from_slice(url.as_bytes())),
        };

        inner.stats.completed.fetch_add(1, Ordering::SeqCst);

        result
    }
}
