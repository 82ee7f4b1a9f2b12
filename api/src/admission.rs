//! Global admission control for client requests.
//!
//! [`AdmissionGate`] is an actix middleware holding a fixed number of slots shared by every
//! worker of the server. Each request acquires a slot before reaching the handler and keeps it
//! until the handler finishes; the slot is released on every exit path because it is owned by
//! the request future. When all slots are taken, requests wait for one to free up. Once the
//! shutdown signal is raised, waiting and new requests are rejected without taking a slot.

use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::ContentType,
};
use fanout::concurrency::shutdown::ShutdownRx;
use futures::future::{LocalBoxFuture, Ready, ok};
use futures::task::{Context, Poll};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Body of the response sent to requests rejected during shutdown.
const SHUTTING_DOWN_MESSAGE: &str = "Server is shutting down";

/// Middleware bounding the number of client requests served at once.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    shutdown_rx: ShutdownRx,
}

impl AdmissionGate {
    pub fn new(max_clients: usize, shutdown_rx: ShutdownRx) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_clients)),
            shutdown_rx,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionGateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AdmissionGateMiddleware {
            service: Rc::new(service),
            slots: self.slots.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
        })
    }
}

pub struct AdmissionGateMiddleware<S> {
    service: Rc<S>,
    slots: Arc<Semaphore>,
    shutdown_rx: ShutdownRx,
}

impl<S, B> Service<ServiceRequest> for AdmissionGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let slots = self.slots.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        Box::pin(async move {
            if shutdown_rx.is_shutdown() {
                return Ok(reject(req));
            }

            let _slot = tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => return Ok(reject(req)),
                slot = slots.clone().acquire_owned() => match slot {
                    Ok(slot) => slot,
                    // The semaphore is never closed while the gate is alive.
                    Err(_) => return Ok(reject(req)),
                },
            };

            debug!(
                available_slots = slots.available_permits(),
                "admitted request"
            );

            let response = service.call(req).await?;

            Ok(response.map_into_left_body())
        })
    }
}

fn reject<B>(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
    warn!(path = %req.path(), "rejecting request, server is shutting down");

    let response = HttpResponse::InternalServerError()
        .insert_header(ContentType::plaintext())
        .body(SHUTTING_DOWN_MESSAGE);

    req.into_response(response).map_into_right_body()
}
