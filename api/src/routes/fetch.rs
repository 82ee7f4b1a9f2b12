use actix_web::{
    HttpRequest, HttpResponse, ResponseError,
    error::PayloadError,
    http::{StatusCode, header::ContentType},
    web::{Data, Payload},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use bytes::BytesMut;
use config::shared::PayloadEncoding;
use fanout::coordinator::RequestCoordinator;
use fanout::error::CoordinatorError;
use fanout::types::{AggregateResult, FetchedUrl, RequestOutcome, UrlRequest};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::config::ApiConfig;
use crate::connection::{ConnectionClosed, ConnectionWatch};

#[derive(Debug, Error)]
pub enum FetchUrlsError {
    #[error("Could not read body")]
    ReadBody(#[source] PayloadError),

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Incorrect json in request")]
    InvalidJson(#[source] serde_json::Error),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("failed to serialize response: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("request coordinator failed: {0}")]
    CoordinatorTask(#[source] JoinError),
}

impl FetchUrlsError {
    pub fn to_message(&self) -> String {
        match self {
            // Internal failures are logged, not described to the client
            FetchUrlsError::Serialization(_) | FetchUrlsError::CoordinatorTask(_) => {
                "Internal Server Error".to_string()
            }
            e => e.to_string(),
        }
    }
}

impl ResponseError for FetchUrlsError {
    fn status_code(&self) -> StatusCode {
        match self {
            FetchUrlsError::ReadBody(_)
            | FetchUrlsError::BodyTooLarge { .. }
            | FetchUrlsError::InvalidJson(_)
            | FetchUrlsError::Coordinator(_) => StatusCode::BAD_REQUEST,
            FetchUrlsError::Serialization(_) | FetchUrlsError::CoordinatorTask(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.to_message())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetchUrlsRequest {
    /// Urls to fetch. A missing or `null` list is treated as empty.
    #[serde(default)]
    pub urls: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlResponse {
    pub url: String,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchUrlsResponse {
    /// Message of the fetch that aborted the request, empty on success.
    pub error: String,
    /// Fetched payloads in completion order, `null` when `error` is set.
    pub responses: Option<Vec<UrlResponse>>,
}

impl FetchUrlsResponse {
    pub fn from_result(result: AggregateResult, encoding: PayloadEncoding) -> Self {
        match result {
            AggregateResult::Succeeded(fetched) => Self {
                error: String::new(),
                responses: Some(
                    fetched
                        .into_iter()
                        .map(|fetched| UrlResponse::new(fetched, encoding))
                        .collect(),
                ),
            },
            AggregateResult::Failed(error) => Self {
                error,
                responses: None,
            },
        }
    }
}

impl UrlResponse {
    fn new(fetched: FetchedUrl, encoding: PayloadEncoding) -> Self {
        Self {
            response: encode_payload(&fetched.payload, encoding),
            url: fetched.url,
        }
    }
}

/// Renders fetched bytes as a JSON string.
pub fn encode_payload(payload: &[u8], encoding: PayloadEncoding) -> String {
    match encoding {
        PayloadEncoding::Text => String::from_utf8_lossy(payload).into_owned(),
        PayloadEncoding::Base64 => BASE64_STANDARD.encode(payload),
    }
}

/// Fetches every url of the request body and returns the aggregated payloads.
///
/// The coordinator runs on its own task and this handler waits for it, so the admission slot
/// is held until the dispatcher has joined its workers. The coordinator cancels its fetches
/// when the client closes the connection or when this handler is dropped.
pub async fn fetch_urls(
    req: HttpRequest,
    payload: Payload,
    config: Data<ApiConfig>,
    coordinator: Data<RequestCoordinator>,
) -> Result<HttpResponse, FetchUrlsError> {
    let body = read_body(payload, config.application.max_body_bytes).await?;
    let request: FetchUrlsRequest =
        serde_json::from_slice(&body).map_err(FetchUrlsError::InvalidJson)?;
    let request = UrlRequest::new(request.urls.unwrap_or_default());

    let connection_closed = req
        .conn_data::<ConnectionWatch>()
        .map(ConnectionWatch::closed);
    let (_handler_guard, handler_dropped) = oneshot::channel::<()>();
    let coordinator = coordinator.into_inner();
    let outcome = tokio::spawn(async move {
        coordinator
            .handle(request, client_gone(connection_closed, handler_dropped))
            .await
    })
    .await
    .map_err(FetchUrlsError::CoordinatorTask)??;

    let result = match outcome {
        RequestOutcome::Respond(result) => result,
        RequestOutcome::Undeliverable => {
            // The watcher has shut the socket down, nothing reaches the client.
            debug!("client disconnected, response dropped");
            return Ok(HttpResponse::NoContent().finish());
        }
    };

    let response = FetchUrlsResponse::from_result(result, config.application.payload_encoding);
    let body = serde_json::to_vec(&response).map_err(|err| {
        error!(error = %err, "failed to serialize response");
        FetchUrlsError::Serialization(err)
    })?;

    Ok(HttpResponse::Ok()
        .insert_header(ContentType::json())
        .body(body))
}

/// Resolves when the client connection closes or the fetch handler is dropped.
async fn client_gone(
    connection_closed: Option<ConnectionClosed>,
    handler_dropped: oneshot::Receiver<()>,
) {
    let connection_closed = async move {
        match connection_closed {
            Some(closed) => closed.wait().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = connection_closed => {}
        _ = handler_dropped => {}
    }
}

async fn read_body(mut payload: Payload, limit: usize) -> Result<BytesMut, FetchUrlsError> {
    let mut body = BytesMut::new();

    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(FetchUrlsError::ReadBody)?;
        if body.len() + chunk.len() > limit {
            return Err(FetchUrlsError::BodyTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn failed_result_has_null_responses() {
        let response = FetchUrlsResponse::from_result(
            AggregateResult::Failed("timeout".to_string()),
            PayloadEncoding::Text,
        );

        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"error":"timeout","responses":null}"#
        );
    }

    #[test]
    fn successful_result_has_empty_error() {
        let response = FetchUrlsResponse::from_result(
            AggregateResult::Succeeded(vec![FetchedUrl {
                url: "http://a".to_string(),
                payload: Bytes::from_static(b"A"),
            }]),
            PayloadEncoding::Text,
        );

        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"error":"","responses":[{"url":"http://a","response":"A"}]}"#
        );
    }

    #[test]
    fn payloads_are_encoded_as_configured() {
        assert_eq!(encode_payload(b"hello", PayloadEncoding::Text), "hello");
        assert_eq!(encode_payload(&[0x66, 0xff], PayloadEncoding::Text), "f\u{fffd}");
        assert_eq!(encode_payload(b"hello", PayloadEncoding::Base64), "aGVsbG8=");
    }

    #[tokio::test]
    async fn client_is_gone_once_the_handler_is_dropped() {
        let (handler_guard, handler_dropped) = oneshot::channel::<()>();
        let gone = tokio::spawn(client_gone(None, handler_dropped));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!gone.is_finished());

        drop(handler_guard);
        tokio::time::timeout(std::time::Duration::from_secs(1), gone)
            .await
            .expect("client_gone did not resolve")
            .unwrap();
    }

    #[test]
    fn missing_or_null_urls_are_empty() {
        let missing: FetchUrlsRequest = serde_json::from_str("{}").unwrap();
        let null: FetchUrlsRequest = serde_json::from_str(r#"{"urls": null}"#).unwrap();

        assert_eq!(missing.urls, None);
        assert_eq!(null.urls, None);
    }

    #[test]
    fn errors_map_to_status_and_plain_message() {
        let too_many = FetchUrlsError::from(CoordinatorError::TooManyUrls { count: 21, max: 20 });
        assert_eq!(too_many.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            too_many.to_message(),
            "Maximum allowed urls in one request is 20"
        );

        let too_large = FetchUrlsError::BodyTooLarge { limit: 16 };
        assert_eq!(too_large.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(too_large.to_message(), "Request body exceeds 16 bytes");

        let json_error = serde_json::from_str::<FetchUrlsRequest>("{").unwrap_err();
        let serialization = FetchUrlsError::Serialization(json_error);
        assert_eq!(
            serialization.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(serialization.to_message(), "Internal Server Error");
    }
}
