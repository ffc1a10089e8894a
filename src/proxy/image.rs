//! Arbitrary-URL image fetcher.
//!
//! Catalog pages embed cover art hosted on third-party CDNs that reject
//! requests without a same-site `Referer` or with a non-browser agent. This
//! fetcher requests the image server-side looking like a browser that is
//! already on the target site: `Referer` is derived from the target URL's own
//! scheme and host, never from the caller. That bypass of hot-link
//! protection is the purpose of this module and is kept as explicit policy.
//!
//! # Design Decisions
//! - Own client, separate from backend pools: follows redirects, short timeout
//! - Only `http`/`https` targets; anything else is rejected before any I/O
//! - Only upstream 200 is relayed; everything else becomes a 502
//! - `Cache-Control` is always set by the gateway, whatever the upstream said

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use reqwest::redirect;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ImageProxyConfig;
use crate::error::{transport_message, GatewayError};
use crate::proxy::relay::stream_response;

const DEFAULT_IMAGE_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors raised while building the image fetcher at startup.
#[derive(Debug, Error)]
pub enum ImageProxyError {
    #[error("invalid image_proxy.{field} header value")]
    InvalidHeader { field: &'static str },

    #[error("failed to build image client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fetches client-supplied absolute image URLs with browser-like headers.
#[derive(Debug)]
pub struct ImageFetchProxy {
    client: reqwest::Client,
    user_agent: HeaderValue,
    accept: HeaderValue,
    cache_control: HeaderValue,
}

impl ImageFetchProxy {
    pub fn new(config: &ImageProxyConfig) -> Result<Self, ImageProxyError> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| ImageProxyError::InvalidHeader { field: "user_agent" })?;
        let accept = HeaderValue::from_str(&config.accept)
            .map_err(|_| ImageProxyError::InvalidHeader { field: "accept" })?;
        let cache_control =
            HeaderValue::from_str(&format!("public, max-age={}", config.cache_max_age_secs))
                .map_err(|_| ImageProxyError::InvalidHeader { field: "cache_max_age_secs" })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect::Policy::limited(config.max_redirects))
            .referer(false)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            user_agent,
            accept,
            cache_control,
        })
    }

    /// Fetch `raw_url` and stream it back with a gateway-owned cache policy.
    pub async fn fetch(&self, raw_url: Option<&str>) -> Result<Response, GatewayError> {
        let target = parse_target(raw_url)?;
        let headers = self.spoofed_headers(&target);

        tracing::debug!(url = %target, "Fetching image");

        let upstream = self
            .client
            .get(target.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                let message = transport_message(&e);
                tracing::error!(url = %target, error = %message, "Failed to fetch image");
                GatewayError::UpstreamUnreachable {
                    error: "Failed to fetch image".to_string(),
                    message,
                }
            })?;

        let status = upstream.status();
        if status != StatusCode::OK {
            tracing::warn!(url = %target, status = %status, "Image upstream returned non-200 status");
            return Err(GatewayError::UpstreamProtocol {
                error: "Upstream returned non-200 status",
                code: Some(status.as_u16()),
            });
        }

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_IMAGE_CONTENT_TYPE));

        let mut response_headers = HeaderMap::with_capacity(2);
        response_headers.insert(header::CONTENT_TYPE, content_type);
        response_headers.insert(header::CACHE_CONTROL, self.cache_control.clone());

        stream_response(StatusCode::OK, response_headers, upstream, target.as_str()).await
    }

    /// Browser-like request headers for `target`.
    pub fn spoofed_headers(&self, target: &Url) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        headers.insert(header::ACCEPT, self.accept.clone());
        if let Some(referer) = referer_for(target) {
            headers.insert(header::REFERER, referer);
        }
        headers
    }
}

/// Validate the `url` query parameter. Performs no I/O.
pub fn parse_target(raw_url: Option<&str>) -> Result<Url, GatewayError> {
    let raw = match raw_url.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            return Err(GatewayError::ClientInput {
                error: "Missing url parameter",
            })
        }
    };

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
        _ => Err(GatewayError::ClientInput {
            error: "Invalid URL",
        }),
    }
}

/// `<scheme>://<host[:port]>/` of the target itself.
fn referer_for(target: &Url) -> Option<HeaderValue> {
    let origin = target.origin();
    if !origin.is_tuple() {
        return None;
    }
    HeaderValue::from_str(&format!("{}/", origin.ascii_serialization())).ok()
}
