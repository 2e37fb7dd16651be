//! Timeline HTTP API
//!
//! Routes:
//! - `GET /` - service banner (readiness probe)
//! - `POST /enter_event`, `POST /exit_event` - record an event (201)
//! - `GET /timeline/{tracking_id}` - compiled timeline
//! - `GET /health`, `GET /metrics` - liveness and Prometheus text
//!
//! Uses hyper's HTTP/1 server with one task per connection.

use crate::domain::types::{EventKind, EventPayload, TrackingId};
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::event_store::EventLog;
use crate::services::timeline_service::{TimelineLookup, TimelineService};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared state for request handlers
pub struct ApiState<L: EventLog> {
    service: Arc<TimelineService<L>>,
    /// Answer `404 []` for a known tracking id with an empty timeline
    empty_timeline_not_found: bool,
}

impl<L: EventLog> ApiState<L> {
    pub fn new(service: Arc<TimelineService<L>>, empty_timeline_not_found: bool) -> Self {
        Self { service, empty_timeline_not_found }
    }
}

fn response(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    response(status, "application/json", body)
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, json!({ "error": message }).to_string().into_bytes())
}

/// Read the request body, enforcing `MAX_BODY_BYTES`
async fn read_body(req: Request<Incoming>) -> Result<Bytes, Response<Full<Bytes>>> {
    match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(json_error(StatusCode::PAYLOAD_TOO_LARGE, "body_too_large"))
        }
        Err(e) => {
            warn!(error = %e, "request_body_read_failed");
            Err(json_error(StatusCode::BAD_REQUEST, "unreadable_body"))
        }
    }
}

async fn handle_event<L: EventLog>(
    req: Request<Incoming>,
    kind: EventKind,
    state: &ApiState<L>,
) -> Response<Full<Bytes>> {
    let body = match read_body(req).await {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let payload: EventPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(kind = %kind.as_str(), error = %e, "event_payload_rejected");
            return json_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    match state.service.record(payload.into_event(kind)) {
        Ok(_) => json_response(StatusCode::CREATED, b"{}".to_vec()),
        Err(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

fn handle_timeline<L: EventLog>(tracking_id: &str, state: &ApiState<L>) -> Response<Full<Bytes>> {
    let tracking_id = TrackingId::from(tracking_id);

    match state.service.get_timeline(&tracking_id) {
        Ok(TimelineLookup::NotFound) => {
            json_error(StatusCode::NOT_FOUND, "tracking_id_not_found")
        }
        Ok(TimelineLookup::Found(timeline)) => {
            let status = if timeline.is_empty() && state.empty_timeline_not_found {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            match serde_json::to_vec(timeline.as_ref()) {
                Ok(body) => json_response(status, body),
                Err(e) => {
                    error!(tracking_id = %tracking_id, error = %e, "timeline_encode_failed");
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, "encode_failed")
                }
            }
        }
        Err(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

/// Handle HTTP requests
async fn handle_request<L: EventLog>(
    req: Request<Incoming>,
    state: Arc<ApiState<L>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match (&method, path.as_str()) {
        (&Method::GET, "/") => json_response(
            StatusCode::OK,
            json!({ "service": "Timeline API" }).to_string().into_bytes(),
        ),
        (&Method::POST, "/enter_event") => handle_event(req, EventKind::Enter, &state).await,
        (&Method::POST, "/exit_event") => handle_event(req, EventKind::Exit, &state).await,
        (&Method::GET, "/health") => response(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/metrics") => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(state.service.metrics(), state.service.tracked_subjects()),
        ),
        (&Method::GET, p) => match p.strip_prefix("/timeline/") {
            Some(id) if !id.is_empty() && !id.contains('/') => handle_timeline(id, &state),
            _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
        },
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };

    debug!(method = %method, path = %path, status = %resp.status().as_u16(), "http_request");
    Ok(resp)
}

/// Accept connections on `listener` until the shutdown signal fires
pub async fn serve<L: EventLog + 'static>(
    listener: TcpListener,
    state: Arc<ApiState<L>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(addr = %listener.local_addr()?, "timeline_api_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                // a dropped sender also stops the loop
                if changed.is_err() || *shutdown.borrow() {
                    info!("timeline_api_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind `addr` and start the API server
pub async fn start_api_server<L: EventLog + 'static>(
    addr: &str,
    state: Arc<ApiState<L>>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}
