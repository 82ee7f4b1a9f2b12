use async_trait::async_trait;
use bytes::Bytes;
use config::shared::FetchConfig;
use tracing::debug;

use crate::error::FetchError;

/// Performs one bounded-time fetch of a single url.
///
/// Implementations issue exactly one outbound call per invocation and never retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// [`Fetcher`] issuing `GET` requests through a shared [`reqwest::Client`].
///
/// Any HTTP status is a success: the response body is the payload. Only timeouts,
/// connection failures and unreadable bodies are errors.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests, body reads included, time out after
    /// [`FetchConfig::timeout`].
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(FetchError::InvalidClient)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::from_send(url, err))?;

        debug!(url, status = %response.status(), "received response headers");

        response
            .bytes()
            .await
            .map_err(|err| FetchError::from_body(url, err))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves a single connection, answering with `body` after `delay`.
    async fn serve_once(body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 1024];
            let _ = socket.read(&mut buffer).await;

            tokio::time::sleep(delay).await;

            let response = format!(
                "HTTP/1.1 404 Not Found\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        format!("http://{address}/")
    }

    fn fetcher_with_timeout(timeout_ms: u64) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            timeout_ms,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_body_regardless_of_status() {
        let url = serve_once("not here", Duration::ZERO).await;

        let payload = fetcher_with_timeout(1000).fetch(&url).await.unwrap();

        assert_eq!(payload, Bytes::from_static(b"not here"));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let url = serve_once("late", Duration::from_millis(500)).await;

        let err = fetcher_with_timeout(100).fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
        assert_eq!(err.to_string(), format!("request to {url} timed out"));
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher_with_timeout(1000)
            .fetch(&format!("http://{address}/"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Connect { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_url_is_a_request_error() {
        let err = fetcher_with_timeout(1000)
            .fetch("not a url")
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Request { .. }), "got {err:?}");
    }
}
