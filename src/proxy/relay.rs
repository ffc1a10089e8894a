//! Upstream response → client response.
//!
//! # States
//! ```text
//! Pending ──first chunk──▶ Forwarding ──end of body──▶ Complete
//!    │                         │
//!    └─error: 502 JSON         └─error: connection terminated (Failed)
//! ```
//!
//! # Design Decisions
//! - Stream mode waits for the first body chunk before committing the status,
//!   so an upstream that dies immediately still yields a JSON error
//! - Once bytes are flushed the status cannot be retracted; a later upstream
//!   error is logged and surfaces as a body error, which aborts the connection
//! - DecodeJson buffers the whole body and never writes a partial response
//! - Dropping the relay body drops the upstream stream, releasing the connection

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::backend::Backend;
use crate::config::RelayMode;
use crate::error::GatewayError;
use crate::proxy::headers::content_type_or_default;

/// Lifecycle of a single relayed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Pending,
    Forwarding,
    Complete,
    Failed,
}

/// Relays one upstream response according to a backend's relay mode.
pub struct ResponseRelay<'a> {
    backend: &'a Backend,
    target: &'a str,
}

impl<'a> ResponseRelay<'a> {
    pub fn new(backend: &'a Backend, target: &'a str) -> Self {
        Self { backend, target }
    }

    pub async fn relay(self, upstream: reqwest::Response) -> Result<Response, GatewayError> {
        match self.backend.relay_mode() {
            RelayMode::Stream => {
                let headers = self.backend.headers().returned(upstream.headers());
                stream_response(upstream.status(), headers, upstream, self.target).await
            }
            RelayMode::DecodeJson => decode_json(upstream, self.target).await,
        }
    }
}

/// Commit `status` and `headers` once the first body chunk has arrived, then
/// copy the rest of the body through without buffering.
pub async fn stream_response(
    status: StatusCode,
    headers: HeaderMap,
    upstream: reqwest::Response,
    target: &str,
) -> Result<Response, GatewayError> {
    let mut stream = upstream.bytes_stream();

    let first = match stream.next().await {
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(e)) => {
            tracing::error!(url = %target, error = %e, "Upstream failed before first byte");
            return Err(GatewayError::UpstreamUnreachable {
                error: "Failed to read upstream response".to_string(),
                message: e.to_string(),
            });
        }
        None => None,
    };

    let body = RelayBody::new(first, stream.boxed(), target.to_string());
    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

async fn decode_json(upstream: reqwest::Response, target: &str) -> Result<Response, GatewayError> {
    let status = upstream.status();
    // Only the upstream's own declaration selects decoding; the default is for the reply.
    let declared_json = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(is_json);
    let content_type = content_type_or_default(upstream.headers());

    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(header::CONTENT_TYPE, content_type.clone());

    if !declared_json {
        // Safety net for images or text behind a JSON API: raw body, no upstream headers.
        tracing::debug!(url = %target, content_type = ?content_type, "Non-JSON body, passing through");
        return stream_response(status, headers, upstream, target).await;
    }

    let bytes = upstream.bytes().await.map_err(|e| {
        tracing::error!(url = %target, error = %e, "Failed to read upstream JSON body");
        GatewayError::UpstreamUnreachable {
            error: "Failed to read upstream response".to_string(),
            message: e.to_string(),
        }
    })?;

    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::error!(url = %target, error = %e, "Failed to decode upstream JSON");
        GatewayError::UpstreamProtocol {
            error: "Invalid JSON from upstream",
            code: None,
        }
    })?;

    let mut response = (status, Json(value)).into_response();
    *response.headers_mut() = headers;
    Ok(response)
}

fn is_json(content_type: &HeaderValue) -> bool {
    content_type
        .to_str()
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false)
}

/// Client-facing body that forwards upstream chunks and records the outcome.
pub struct RelayBody {
    first: Option<Bytes>,
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    target: String,
    bytes_sent: u64,
    state: RelayState,
}

impl RelayBody {
    fn new(
        first: Option<Bytes>,
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        target: String,
    ) -> Self {
        let state = if first.is_some() {
            RelayState::Forwarding
        } else {
            RelayState::Pending
        };
        Self {
            first,
            inner,
            target,
            bytes_sent: 0,
            state,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if matches!(this.state, RelayState::Complete | RelayState::Failed) {
            return Poll::Ready(None);
        }

        if let Some(chunk) = this.first.take() {
            this.bytes_sent += chunk.len() as u64;
            return Poll::Ready(Some(Ok(chunk)));
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.state = RelayState::Forwarding;
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.state = RelayState::Failed;
                tracing::error!(
                    url = %this.target,
                    bytes_sent = this.bytes_sent,
                    error = %e,
                    "Upstream stream failed after response was committed"
                );
                Poll::Ready(Some(Err(std::io::Error::other(e))))
            }
            Poll::Ready(None) => {
                this.state = RelayState::Complete;
                tracing::debug!(url = %this.target, bytes_sent = this.bytes_sent, "Relay complete");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if self.state == RelayState::Forwarding {
            tracing::debug!(
                url = %self.target,
                bytes_sent = self.bytes_sent,
                "Client went away mid-relay, releasing upstream connection"
            );
        }
    }
}
