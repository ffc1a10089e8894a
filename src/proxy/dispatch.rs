//! Catch-all proxy route.
//!
//! One generic dispatcher serves every backend; the per-backend differences
//! (rewrite rule, header policy, relay mode) come from the registry entry.

use axum::{
    body::{Body, HttpBody},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

use crate::backend::{Backend, BackendRegistry};
use crate::config::RetryConfig;
use crate::error::{self, transport_message, GatewayError};
use crate::observability::metrics;
use crate::proxy::headers::ConnectionInfo;
use crate::proxy::relay::ResponseRelay;
use crate::proxy::rewrite::TargetUrlError;
use crate::resilience::{backoff::calculate_backoff, retries};

/// Composes rewrite → header policy → upstream call → relay.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    retry: RetryConfig,
    max_body_size: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<BackendRegistry>, retry: RetryConfig, max_body_size: usize) -> Self {
        Self {
            registry,
            retry,
            max_body_size,
        }
    }

    /// Backend that would serve `path`, if any.
    pub fn route(&self, path: &str) -> Option<&Arc<Backend>> {
        self.registry.resolve(path)
    }

    pub async fn dispatch(&self, peer: SocketAddr, request: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();

        let Some(backend) = self.registry.resolve(parts.uri.path()) else {
            tracing::warn!(path = %parts.uri.path(), "No route matched");
            metrics::record_request(method.as_str(), 404, "none", start);
            return error::not_found().await;
        };

        let response = match self.forward(backend, peer, parts, body).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };

        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            backend.name(),
            start,
        );
        response
    }

    async fn forward(
        &self,
        backend: &Backend,
        peer: SocketAddr,
        parts: Parts,
        body: Body,
    ) -> Result<Response, GatewayError> {
        let path = parts.uri.path();
        let target = backend
            .rewriter()
            .target_url(backend.base_url(), path, parts.uri.query())
            .map_err(|e| {
                tracing::error!(backend = %backend.name(), path = %path, error = %e, "Failed to build target URL");
                match e {
                    TargetUrlError::EscapesPrefix(_) => GatewayError::ClientInput {
                        error: "Invalid path",
                    },
                    TargetUrlError::Parse(e) => GatewayError::Construction {
                        error: "Invalid target URL",
                        message: e.to_string(),
                    },
                }
            })?;

        let conn = ConnectionInfo::from_parts(peer.ip(), &parts);
        let headers = backend.headers().forward(&parts.headers, &conn);

        tracing::info!(
            backend = %backend.name(),
            method = %parts.method,
            from = %path,
            to = %target,
            ip = %peer.ip(),
            "Proxying request"
        );

        // Held until the relay has committed a status; a saturated backend only queues its own traffic.
        let _slot = backend.admit().await.map_err(|e| GatewayError::Construction {
            error: "Failed to admit request",
            message: e.to_string(),
        })?;

        let upstream = self
            .send(backend, &parts.method, &target, headers, body)
            .await?;

        tracing::info!(
            backend = %backend.name(),
            status = %upstream.status(),
            url = %target,
            "Proxy response"
        );

        ResponseRelay::new(backend, target.as_str())
            .relay(upstream)
            .await
    }

    /// Issue the upstream call. One attempt unless the retry policy allows more.
    async fn send(
        &self,
        backend: &Backend,
        method: &Method,
        target: &Url,
        mut headers: HeaderMap,
        body: Body,
    ) -> Result<reqwest::Response, GatewayError> {
        let max_attempts = retries::max_attempts(&self.retry, method);

        if max_attempts == 1 {
            let mut request = backend.client().request(method.clone(), target.clone());
            match body.size_hint().exact() {
                Some(0) => {}
                Some(len) => {
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
                    request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
                }
                None => {
                    request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
                }
            }
            return request
                .headers(headers)
                .send()
                .await
                .map_err(|e| unreachable(backend, target, &e));
        }

        let bytes = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                tracing::warn!(backend = %backend.name(), error = %e, "Failed to buffer request body");
                GatewayError::ClientInput {
                    error: "Failed to read request body",
                }
            })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = backend
                .client()
                .request(method.clone(), target.clone())
                .headers(headers.clone());
            if !bytes.is_empty() {
                request = request.body(bytes.clone());
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < max_attempts && retries::is_retryable(method, &e) => {
                    let delay =
                        calculate_backoff(attempt, self.retry.base_delay_ms, self.retry.max_delay_ms);
                    tracing::warn!(
                        backend = %backend.name(),
                        url = %target,
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Retrying after transport error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(unreachable(backend, target, &e)),
            }
        }
    }
}

fn unreachable(backend: &Backend, target: &Url, e: &reqwest::Error) -> GatewayError {
    let message = transport_message(e);
    tracing::error!(
        backend = %backend.name(),
        url = %target,
        timeout = ?backend.timeout(),
        error = %message,
        "Proxy request failed"
    );
    GatewayError::UpstreamUnreachable {
        error: format!("Failed to reach {} API", backend.name()),
        message,
    }
}
