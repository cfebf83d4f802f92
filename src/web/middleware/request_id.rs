//! Per-request tracing spans with propagated request IDs.
//!
//! An inbound `X-Request-Id` from a proxy is reused when it looks sane so
//! logs correlate across hops; otherwise a ULID is generated. The resolved
//! ID is always echoed back in the `X-Request-Id` response header.

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{Instrument, Level};

use crate::utils::fmt_duration;

static REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_INBOUND_ID_LEN: usize = 64;

/// Endpoints the UI polls on a timer.
const POLLED_PATHS: &[&str] = &["/api/health", "/api/status", "/api/prices/refresh-status"];

#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

/// Accept upstream IDs made of URL-safe characters only.
fn usable_inbound_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_INBOUND_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn resolve_request_id(req: &Request) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| usable_inbound_id(v))
        .map(String::from)
        .unwrap_or_else(|| ulid::Ulid::new().to_string())
}

/// Log level for a finished request.
///
/// Successful polls stay at trace. A refused refresh (cooldown, already
/// running, nothing to cancel) is an expected answer, not a client mistake.
fn response_level(path: &str, status: StatusCode) -> Level {
    match status.as_u16() {
        200..=399 if POLLED_PATHS.contains(&path) => Level::TRACE,
        200..=399 => Level::DEBUG,
        409 | 429 => Level::DEBUG,
        400..=499 => Level::INFO,
        _ => Level::WARN,
    }
}

fn log_response(level: Level, status: StatusCode, elapsed: String) {
    let status = status.as_u16();
    match level {
        Level::TRACE => tracing::trace!(status, elapsed, "Response"),
        Level::DEBUG => tracing::debug!(status, elapsed, "Response"),
        Level::INFO => tracing::info!(status, elapsed, "Response"),
        _ => tracing::warn!(status, elapsed, "Response"),
    }
}

impl<S, B> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let req_id = resolve_request_id(&req);
        let path = req.uri().path().to_owned();
        let span = tracing::info_span!(
            "request",
            req_id = %req_id,
            method = %req.method(),
            path = %path,
        );
        let header_value = HeaderValue::from_str(&req_id).ok();
        let start = Instant::now();

        let future = self.inner.call(req);

        Box::pin(
            async move {
                let mut result = future.await;
                let elapsed = fmt_duration(start.elapsed());

                match &mut result {
                    Ok(response) => {
                        log_response(
                            response_level(&path, response.status()),
                            response.status(),
                            elapsed,
                        );
                        if let Some(value) = header_value {
                            response.headers_mut().insert(REQUEST_ID_HEADER, value);
                        }
                    }
                    Err(e) => tracing::error!(error = ?e, elapsed, "Request failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_ids_are_filtered() {
        assert!(usable_inbound_id("01HZX3V6Q7C8KJ0M2N4P5R6S7T"));
        assert!(usable_inbound_id("edge-abc_123.4"));
        assert!(!usable_inbound_id(""));
        assert!(!usable_inbound_id("has space"));
        assert!(!usable_inbound_id(&"a".repeat(65)));
    }

    #[test]
    fn inbound_id_is_reused_when_usable() {
        let req = Request::builder()
            .header(REQUEST_ID_HEADER, "edge-42")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(resolve_request_id(&req), "edge-42");

        let req = Request::builder()
            .header(REQUEST_ID_HEADER, "not usable")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(resolve_request_id(&req).len(), 26);
    }

    #[test]
    fn polling_and_refusals_log_quietly() {
        assert_eq!(
            response_level("/api/prices/refresh-status", StatusCode::OK),
            Level::TRACE
        );
        assert_eq!(
            response_level("/api/prices/refresh", StatusCode::OK),
            Level::DEBUG
        );
        assert_eq!(
            response_level("/api/prices/refresh", StatusCode::TOO_MANY_REQUESTS),
            Level::DEBUG
        );
        assert_eq!(
            response_level("/api/prices/refresh", StatusCode::BAD_REQUEST),
            Level::INFO
        );
        assert_eq!(
            response_level("/api/prices/refresh", StatusCode::SERVICE_UNAVAILABLE),
            Level::WARN
        );
        assert_eq!(
            response_level("/api/health", StatusCode::SERVICE_UNAVAILABLE),
            Level::WARN
        );
    }
}
