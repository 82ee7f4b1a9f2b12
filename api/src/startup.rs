use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, dev::Server, web};
use fanout::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use fanout::coordinator::RequestCoordinator;
use fanout::fetcher::{Fetcher, HttpFetcher};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::admission::AdmissionGate;
use crate::config::ApiConfig;
use crate::connection::watch_connection;
use crate::routes::{fetch::fetch_urls, method_not_allowed};
use crate::shutdown::{ShutdownController, termination_signal};

/// Fetch service application server wrapper.
///
/// Owns the HTTP server together with the shutdown signal its admission gate listens to.
pub struct Application {
    port: u16,
    server: Server,
    shutdown_tx: ShutdownTx,
    drain_deadline: Duration,
}

impl Application {
    /// Builds the server with an HTTP fetcher configured from `config.fetch`.
    pub async fn build(config: ApiConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(&config.fetch)?;

        Self::build_with_fetcher(config, Arc::new(fetcher))
    }

    /// Builds the server with a caller-provided [`Fetcher`].
    pub fn build_with_fetcher(
        config: ApiConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();

        info!(
            host = %config.application.host,
            port,
            route = %config.application.route,
            "starting fetch service"
        );

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let drain_deadline = config.admission.drain_deadline();
        let server = run(config, listener, fetcher, shutdown_rx)?;

        Ok(Self {
            port,
            server,
            shutdown_tx,
            drain_deadline,
        })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns a handle raising the shutdown signal observed by the admission gate.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Runs the server until SIGINT or SIGTERM, then drains it.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.run_until(termination_signal()).await
    }

    /// Runs the server until `trigger` resolves, then drains it.
    pub async fn run_until<F>(self, trigger: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()>,
    {
        ShutdownController::new(self.shutdown_tx, self.drain_deadline)
            .run(self.server, trigger)
            .await
    }
}

/// Creates the HTTP server serving the fetch route behind the admission gate.
///
/// Every accepted connection is watched for its client going away. Signal handling is left to
/// the caller: the server only stops through its handle.
pub fn run(
    config: ApiConfig,
    listener: TcpListener,
    fetcher: Arc<dyn Fetcher>,
    shutdown_rx: ShutdownRx,
) -> Result<Server, anyhow::Error> {
    let coordinator = web::Data::new(RequestCoordinator::new(fetcher, &config.fetch));
    let admission_gate = AdmissionGate::new(config.admission.max_clients, shutdown_rx);
    let route = config.application.route.clone();
    let workers = config.application.workers;
    let drain_deadline = config.admission.drain_deadline();
    let config = web::Data::new(config);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(admission_gate.clone())
            .wrap(TracingLogger::default())
            .app_data(config.clone())
            .app_data(coordinator.clone())
            .service(
                web::resource(route.as_str())
                    .route(web::post().to(fetch_urls))
                    .default_service(web::to(method_not_allowed)),
            )
    })
    .on_connect(watch_connection)
    .disable_signals()
    .shutdown_timeout(drain_deadline.as_secs());

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    let server = server.listen(listener)?.run();

    Ok(server)
}
