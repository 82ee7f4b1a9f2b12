//! Process termination handling.
//!
//! On a termination request, the [`ShutdownController`] raises the process-wide shutdown
//! signal so that the admission gate rejects further requests, stops the server from
//! accepting connections and lets in-flight requests complete until the drain deadline.

use std::future::Future;
use std::io;
use std::time::Duration;

use actix_web::dev::Server;
use fanout::concurrency::shutdown::ShutdownTx;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Extra time given to the server to report it has stopped after actix force-closed the
/// connections still open at the drain deadline.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Coordinates the graceful shutdown of a running server.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_tx: ShutdownTx,
    drain_deadline: Duration,
}

impl ShutdownController {
    pub fn new(shutdown_tx: ShutdownTx, drain_deadline: Duration) -> Self {
        Self {
            shutdown_tx,
            drain_deadline,
        }
    }

    /// Runs `server` until it stops on its own or `trigger` resolves, then drains it.
    ///
    /// In-flight requests get the drain deadline to complete. Past it, actix drops the
    /// remaining handlers, which cancels their fetches, and the server task is aborted if it
    /// still has not stopped.
    pub async fn run<F>(self, server: Server, trigger: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let server_handle = server.handle();
        let mut server = tokio::spawn(server);

        tokio::select! {
            result = &mut server => return flatten(result),
            _ = trigger => {}
        }

        if self.shutdown_tx.shutdown() {
            info!(
                drain_deadline_secs = self.drain_deadline.as_secs(),
                "shutdown started, draining in-flight requests"
            );
        }

        let drain = async {
            server_handle.stop(true).await;
            (&mut server).await
        };

        let drained = tokio::time::timeout(self.drain_deadline + STOP_GRACE, drain).await;
        match drained {
            Ok(result) => {
                info!("server stopped");
                flatten(result)
            }
            Err(_) => {
                warn!(
                    drain_deadline_secs = self.drain_deadline.as_secs(),
                    "drain deadline exceeded, aborting remaining work"
                );
                server.abort();
                Ok(())
            }
        }
    }
}

fn flatten(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match result {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "server task failed");
            Err(io::Error::other(err))
        }
    }
}

/// Resolves once the process receives SIGINT or SIGTERM.
///
/// A signal whose handler cannot be registered is logged and never fires.
pub async fn termination_signal() {
    let sigint = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to register sigint handler");
            std::future::pending::<()>().await;
        }
    };

    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to register sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigint => info!("sigint (ctrl+c) received, shutting down"),
        _ = sigterm => info!("sigterm received, shutting down"),
    }
}
