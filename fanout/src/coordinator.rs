//! End-to-end handling of one client request.
//!
//! The coordinator validates the request size, starts a [`Dispatcher`] for its urls and
//! collects outcomes while racing them against the client disconnecting. The first failed
//! fetch cancels the request and discards every payload collected so far. Whatever the
//! outcome, the coordinator waits for the dispatcher to join before returning, so no work
//! attributable to the request survives it.

use std::future::Future;
use std::sync::Arc;

use config::shared::FetchConfig;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::concurrency::cancel::create_cancel_signal;
use crate::dispatcher::Dispatcher;
use crate::error::CoordinatorError;
use crate::fetcher::Fetcher;
use crate::types::{AggregateResult, FetchedUrl, RequestOutcome, UrlRequest};

/// Failure message reported when workers exit without an outcome for every url.
const WORKERS_STOPPED_MESSAGE: &str = "fetch workers stopped before reporting every url";

#[derive(Debug, Clone)]
pub struct RequestCoordinator {
    dispatcher: Dispatcher,
    max_urls: usize,
}

impl RequestCoordinator {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &FetchConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(fetcher, config.max_workers),
            max_urls: config.max_urls,
        }
    }

    pub fn max_urls(&self) -> usize {
        self.max_urls
    }

    /// Fetches every url of `request` and aggregates the outcomes.
    ///
    /// Requests with more than [`RequestCoordinator::max_urls`] urls are rejected before any
    /// fetch starts. When `client_disconnected` resolves first, the request is cancelled and
    /// [`RequestOutcome::Undeliverable`] is returned. Payloads are in completion order.
    pub async fn handle<D>(
        &self,
        request: UrlRequest,
        client_disconnected: D,
    ) -> Result<RequestOutcome, CoordinatorError>
    where
        D: Future<Output = ()>,
    {
        let url_count = request.len();
        if url_count > self.max_urls {
            warn!(url_count, max_urls = self.max_urls, "rejecting request with too many urls");
            return Err(CoordinatorError::TooManyUrls {
                count: url_count,
                max: self.max_urls,
            });
        }

        if request.is_empty() {
            return Ok(RequestOutcome::Respond(AggregateResult::Succeeded(
                Vec::new(),
            )));
        }

        debug!(
            url_count,
            worker_count = self.dispatcher.worker_count(url_count),
            "dispatching request"
        );

        // Sized to the request so workers never block on a coordinator that stopped reading.
        let (results_tx, mut results_rx) = mpsc::channel(url_count);
        let (cancel_tx, cancel_rx) = create_cancel_signal();

        let dispatcher = self.dispatcher.clone();
        let dispatch = tokio::spawn(async move {
            dispatcher
                .dispatch(request.into_urls(), results_tx, cancel_rx)
                .await
        });

        tokio::pin!(client_disconnected);

        let mut responses = Vec::with_capacity(url_count);
        let mut aborted = None;

        for _ in 0..url_count {
            tokio::select! {
                received = results_rx.recv() => {
                    let Some(outcome) = received else {
                        cancel_tx.cancel();
                        error!(
                            received = responses.len(),
                            url_count,
                            "fetch workers stopped before reporting every url"
                        );
                        aborted = Some(RequestOutcome::Respond(AggregateResult::Failed(
                            WORKERS_STOPPED_MESSAGE.to_string(),
                        )));
                        break;
                    };

                    let (url, result) = outcome.into_parts();
                    match result {
                        Ok(payload) => responses.push(FetchedUrl { url, payload }),
                        Err(err) => {
                            cancel_tx.cancel();
                            warn!(url = %url, error = %err, "fetch failed, aborting request");
                            aborted = Some(RequestOutcome::Respond(AggregateResult::Failed(
                                err.to_string(),
                            )));
                            break;
                        }
                    }
                }
                _ = &mut client_disconnected => {
                    cancel_tx.cancel();
                    info!(
                        received = responses.len(),
                        url_count,
                        "client disconnected, abandoning request"
                    );
                    aborted = Some(RequestOutcome::Undeliverable);
                    break;
                }
            }
        }

        if let Err(err) = dispatch.await {
            error!(error = %err, "dispatcher terminated abnormally");
        }

        Ok(aborted.unwrap_or(RequestOutcome::Respond(AggregateResult::Succeeded(
            responses,
        ))))
    }
}
