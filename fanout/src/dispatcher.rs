//! Bounded fan-out of url fetches across a fixed pool of workers.
//!
//! The urls of one request are preloaded into a closed task queue sized to the request. A
//! fixed number of workers compete for tasks from that queue, fetch each url and push one
//! [`FetchOutcome`] per url onto the results channel. Before drawing a task, a worker checks
//! the request's cancellation signal; once it is raised no new fetch starts, while fetches
//! already in flight run to completion or to their own timeout.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::concurrency::cancel::CancelRx;
use crate::fetcher::Fetcher;
use crate::types::FetchOutcome;

type TaskQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// Fans the urls of a request out over at most `max_workers` concurrent fetches.
#[derive(Clone)]
pub struct Dispatcher {
    fetcher: Arc<dyn Fetcher>,
    max_workers: usize,
}

impl Dispatcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers,
        }
    }

    /// Number of workers spawned for a request of `url_count` urls.
    pub fn worker_count(&self, url_count: usize) -> usize {
        self.max_workers.min(url_count)
    }

    /// Fetches every url unless cancelled, pushing one outcome per fetched url to `results_tx`.
    ///
    /// Returns only after every worker has exited. Fetch failures are reported as outcomes,
    /// never as an error of the dispatch itself. `results_tx` should have room for every url
    /// so that workers never wait on a consumer that stopped reading.
    pub async fn dispatch(
        &self,
        urls: Vec<String>,
        results_tx: mpsc::Sender<FetchOutcome>,
        cancel_rx: CancelRx,
    ) {
        let worker_count = self.worker_count(urls.len());
        if worker_count == 0 {
            return;
        }

        let (tasks_tx, tasks_rx) = mpsc::channel(urls.len());
        for url in urls {
            // The queue holds every url and its receiver is alive, so this never waits.
            if tasks_tx.send(url).await.is_err() {
                break;
            }
        }
        // Closing the queue lets workers exit once it is drained.
        drop(tasks_tx);

        let tasks: TaskQueue = Arc::new(Mutex::new(tasks_rx));
        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(run_worker(
                worker_id,
                self.fetcher.clone(),
                tasks.clone(),
                results_tx.clone(),
                cancel_rx.clone(),
            ));
        }
        drop(results_tx);

        debug!(worker_count, "fetch workers started");

        while let Some(result) = workers.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "fetch worker terminated abnormally");
            }
        }

        debug!(worker_count, "fetch workers stopped");
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_workers", &self.max_workers)
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    worker_id: usize,
    fetcher: Arc<dyn Fetcher>,
    tasks: TaskQueue,
    results_tx: mpsc::Sender<FetchOutcome>,
    mut cancel_rx: CancelRx,
) {
    loop {
        let url = tokio::select! {
            biased;

            _ = cancel_rx.cancelled() => {
                debug!(worker_id, "fetch worker cancelled");
                return;
            }
            url = next_task(&tasks) => match url {
                Some(url) => url,
                None => return,
            },
        };

        let result = fetcher.fetch(&url).await;
        if let Err(err) = &result {
            debug!(worker_id, url = %url, error = %err, "fetch failed");
        }

        if results_tx.send(FetchOutcome::new(url, result)).await.is_err() {
            // Nobody is collecting anymore.
            return;
        }
    }
}

async fn next_task(tasks: &Mutex<mpsc::Receiver<String>>) -> Option<String> {
    tasks.lock().await.recv().await
}
