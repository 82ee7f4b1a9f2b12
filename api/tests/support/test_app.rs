#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use api::config::{AdmissionConfig, ApiConfig, ApplicationSettings};
use api::routes::fetch::FetchUrlsRequest;
use api::startup::Application;
use config::shared::{FetchConfig, PayloadEncoding};
use fanout::concurrency::shutdown::ShutdownTx;
use fanout::test_utils::MockFetcher;
use telemetry::tracing::init_test_tracing;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub api_client: reqwest::Client,
    pub fetcher: MockFetcher,
    shutdown_tx: ShutdownTx,
    stop_tx: Option<oneshot::Sender<()>>,
    server_handle: JoinHandle<io::Result<()>>,
}

impl TestApp {
    pub fn route_url(&self) -> String {
        format!("{}{}", self.address, ApplicationSettings::DEFAULT_ROUTE)
    }

    pub async fn post_urls(&self, urls: &[&str]) -> reqwest::Response {
        let request = FetchUrlsRequest {
            urls: Some(urls.iter().map(|url| url.to_string()).collect()),
        };

        self.api_client
            .post(self.route_url())
            .json(&request)
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn post_body(&self, body: impl Into<reqwest::Body>) -> reqwest::Response {
        self.api_client
            .post(self.route_url())
            .body(body)
            .send()
            .await
            .expect("failed to execute request")
    }

    /// Opens a raw connection and writes a fetch request for `urls` without reading the reply.
    pub async fn send_raw_urls(&self, urls: &[String]) -> TcpStream {
        let body = serde_json::to_string(&FetchUrlsRequest {
            urls: Some(urls.to_vec()),
        })
        .expect("failed to serialize request");
        let request = format!(
            "POST {} HTTP/1.1\r\nhost: 127.0.0.1:{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
            ApplicationSettings::DEFAULT_ROUTE,
            self.port,
            body.len(),
        );

        let mut stream = TcpStream::connect(("127.0.0.1", self.port))
            .await
            .expect("failed to connect");
        stream
            .write_all(request.as_bytes())
            .await
            .expect("failed to write request");

        stream
    }

    pub async fn get_route(&self) -> reqwest::Response {
        self.api_client
            .get(self.route_url())
            .send()
            .await
            .expect("failed to execute request")
    }

    /// Raises the shutdown signal without stopping the server.
    pub fn raise_shutdown(&self) {
        self.shutdown_tx.shutdown();
    }

    /// Triggers a graceful shutdown and waits for the server to stop.
    pub async fn stop(mut self) -> io::Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        (&mut self.server_handle)
            .await
            .expect("server task panicked")
    }
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            route: ApplicationSettings::DEFAULT_ROUTE.to_string(),
            workers: Some(2),
            max_body_bytes: ApplicationSettings::DEFAULT_MAX_BODY_BYTES,
            payload_encoding: PayloadEncoding::Text,
        },
        admission: AdmissionConfig {
            max_clients: AdmissionConfig::DEFAULT_MAX_CLIENTS,
            drain_deadline_secs: 1,
        },
        fetch: FetchConfig::default(),
    }
}

pub async fn spawn_test_app(fetcher: MockFetcher) -> TestApp {
    spawn_test_app_with_config(test_config(), fetcher).await
}

pub async fn spawn_test_app_with_config(config: ApiConfig, fetcher: MockFetcher) -> TestApp {
    init_test_tracing();

    let application = Application::build_with_fetcher(config, Arc::new(fetcher.clone()))
        .expect("failed to build application");
    let port = application.port();
    let shutdown_tx = application.shutdown_tx();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_handle = tokio::spawn(application.run_until(async move {
        let _ = stop_rx.await;
    }));

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        port,
        api_client: reqwest::Client::new(),
        fetcher,
        shutdown_tx,
        stop_tx: Some(stop_tx),
        server_handle,
    }
}
