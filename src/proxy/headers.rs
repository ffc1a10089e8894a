//! Header policy at the gateway boundary.
//!
//! # Forward direction (client → upstream)
//! - `All`: every end-to-end header is copied, then `X-Forwarded-For`,
//!   `X-Forwarded-Proto` and `X-Forwarded-Host` are overwritten from the
//!   actual connection. Client-supplied values for these three are dropped.
//! - `AllowList`: only the listed headers cross.
//!
//! Connection-scoped headers (`Host`, hop-by-hop, `Content-Length`) never
//! cross in either forward policy; the outbound client derives them from the
//! target URL and the body framing.
//!
//! # Return direction (upstream → client)
//! - `All`: upstream end-to-end headers verbatim, CORS and `Content-Length`
//!   included. Hop-by-hop headers are dropped; the server re-frames the body.
//! - `ContentTypeOnly`: a single gateway-chosen `Content-Type`, so that
//!   cross-origin headers have exactly one authority outside the relay.

use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue};
use std::net::IpAddr;

use crate::config::{BackendConfig, ForwardHeaderPolicy, ReturnHeaderPolicy};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Content type used when the upstream's is missing or unusable.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Facts about the inbound connection, never taken from client headers.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer_ip: IpAddr,
    /// TLS terminates outside the gateway, so this is the scheme the gateway itself serves.
    pub scheme: &'static str,
    pub host: Option<HeaderValue>,
}

impl ConnectionInfo {
    pub fn from_parts(peer_ip: IpAddr, parts: &Parts) -> Self {
        let host = parts.headers.get(header::HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });
        Self {
            peer_ip,
            scheme: "http",
            host,
        }
    }
}

#[derive(Debug, Clone)]
enum ForwardRule {
    All,
    AllowList(Vec<HeaderName>),
}

/// Per-backend header policy, fixed at startup.
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    forward: ForwardRule,
    returned: ReturnHeaderPolicy,
}

impl HeaderFilter {
    pub fn from_config(config: &BackendConfig) -> Result<Self, header::InvalidHeaderName> {
        let forward = match &config.forward_headers {
            ForwardHeaderPolicy::All => ForwardRule::All,
            ForwardHeaderPolicy::AllowList(names) => ForwardRule::AllowList(
                names
                    .iter()
                    .map(|n| HeaderName::from_bytes(n.trim().as_bytes()))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(Self {
            forward,
            returned: config.return_headers(),
        })
    }

    /// Headers sent to the upstream.
    pub fn forward(&self, inbound: &HeaderMap, conn: &ConnectionInfo) -> HeaderMap {
        match &self.forward {
            ForwardRule::All => {
                let tokens = connection_tokens(inbound);
                let mut out = HeaderMap::with_capacity(inbound.len() + 3);
                for (name, value) in inbound.iter() {
                    if is_connection_scoped(name)
                        || tokens.iter().any(|t| name.as_str().eq_ignore_ascii_case(t))
                        || *name == X_FORWARDED_FOR
                        || *name == X_FORWARDED_PROTO
                        || *name == X_FORWARDED_HOST
                    {
                        continue;
                    }
                    out.append(name.clone(), value.clone());
                }

                if let Ok(ip) = HeaderValue::from_str(&conn.peer_ip.to_string()) {
                    out.insert(X_FORWARDED_FOR, ip);
                }
                out.insert(X_FORWARDED_PROTO, HeaderValue::from_static(conn.scheme));
                if let Some(host) = &conn.host {
                    out.insert(X_FORWARDED_HOST, host.clone());
                }
                out
            }
            ForwardRule::AllowList(allowed) => {
                let mut out = HeaderMap::new();
                for name in allowed {
                    if is_connection_scoped(name) {
                        continue;
                    }
                    for value in inbound.get_all(name) {
                        out.append(name.clone(), value.clone());
                    }
                }
                out
            }
        }
    }

    /// Headers sent back to the client.
    pub fn returned(&self, upstream: &HeaderMap) -> HeaderMap {
        match self.returned {
            ReturnHeaderPolicy::All => {
                let tokens = connection_tokens(upstream);
                let mut out = HeaderMap::with_capacity(upstream.len());
                for (name, value) in upstream.iter() {
                    if HOP_BY_HOP.contains(&name.as_str())
                        || tokens.iter().any(|t| name.as_str().eq_ignore_ascii_case(t))
                    {
                        continue;
                    }
                    out.append(name.clone(), value.clone());
                }
                out
            }
            ReturnHeaderPolicy::ContentTypeOnly => {
                let mut out = HeaderMap::with_capacity(1);
                out.insert(header::CONTENT_TYPE, content_type_or_default(upstream));
                out
            }
        }
    }
}

/// Upstream `Content-Type` if present and readable, else `application/json`.
pub fn content_type_or_default(upstream: &HeaderMap) -> HeaderValue {
    upstream
        .get(header::CONTENT_TYPE)
        .filter(|v| v.to_str().map(|s| !s.trim().is_empty()).unwrap_or(false))
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

fn is_connection_scoped(name: &HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONTENT_LENGTH
        || HOP_BY_HOP.contains(&name.as_str())
}

/// Header names listed in `Connection`, which are hop-by-hop for this exchange.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayMode;
    use axum::http::Request;

    fn conn() -> ConnectionInfo {
        ConnectionInfo {
            peer_ip: "203.0.113.7".parse().unwrap(),
            scheme: "http",
            host: Some(HeaderValue::from_static("gateway.example.com")),
        }
    }

    fn filter(forward: ForwardHeaderPolicy, relay_mode: RelayMode) -> HeaderFilter {
        let mut config = BackendConfig::new("anime", "http://localhost:3001");
        config.forward_headers = forward;
        config.relay_mode = relay_mode;
        HeaderFilter::from_config(&config).unwrap()
    }

    #[test]
    fn test_forward_all_overwrites_forwarded_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        inbound.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        inbound.insert("x-forwarded-host", HeaderValue::from_static("evil.example"));
        inbound.append("accept-language", HeaderValue::from_static("en"));
        inbound.append("accept-language", HeaderValue::from_static("id"));
        inbound.insert("cookie", HeaderValue::from_static("session=abc"));

        let out = filter(ForwardHeaderPolicy::All, RelayMode::Stream).forward(&inbound, &conn());

        assert_eq!(out.get("x-forwarded-for").unwrap(), "203.0.113.7");
        assert_eq!(out.get("x-forwarded-proto").unwrap(), "http");
        assert_eq!(out.get("x-forwarded-host").unwrap(), "gateway.example.com");
        assert_eq!(out.get_all("x-forwarded-for").iter().count(), 1);
        assert_eq!(out.get_all("accept-language").iter().count(), 2);
        assert_eq!(out.get("cookie").unwrap(), "session=abc");
    }

    #[test]
    fn test_forward_all_drops_connection_scoped_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gateway.example.com"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, X-Hop"));
        inbound.insert("x-hop", HeaderValue::from_static("1"));
        inbound.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        inbound.insert("x-keep", HeaderValue::from_static("yes"));

        let out = filter(ForwardHeaderPolicy::All, RelayMode::Stream).forward(&inbound, &conn());

        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONTENT_LENGTH).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
        assert!(out.get("x-hop").is_none());
        assert_eq!(out.get("x-keep").unwrap(), "yes");
    }

    #[test]
    fn test_allow_list_forwards_only_named_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t0k3n"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("session=abc"));
        inbound.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));

        let policy =
            ForwardHeaderPolicy::AllowList(vec!["Authorization".into(), "content-type".into()]);
        let out = filter(policy, RelayMode::DecodeJson).forward(&inbound, &conn());

        assert_eq!(out.len(), 2);
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer t0k3n");
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_allow_list_name_is_rejected() {
        let mut config = BackendConfig::new("manga", "http://localhost:3002");
        config.forward_headers = ForwardHeaderPolicy::AllowList(vec!["bad header".into()]);
        assert!(HeaderFilter::from_config(&config).is_err());
    }

    #[test]
    fn test_return_all_is_verbatim() {
        let mut upstream = HeaderMap::new();
        upstream.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        upstream.append("set-cookie", HeaderValue::from_static("a=1"));
        upstream.append("set-cookie", HeaderValue::from_static("b=2"));

        let out = filter(ForwardHeaderPolicy::All, RelayMode::Stream).returned(&upstream);
        assert_eq!(out, upstream);
    }

    #[test]
    fn test_return_all_drops_hop_by_hop() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-upstream-hop"));
        upstream.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        upstream.insert("x-upstream-hop", HeaderValue::from_static("1"));
        upstream.insert(header::ETAG, HeaderValue::from_static("\"v1\""));

        let out = filter(ForwardHeaderPolicy::All, RelayMode::Stream).returned(&upstream);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(header::CONTENT_LENGTH).unwrap(), "42");
        assert_eq!(out.get(header::ETAG).unwrap(), "\"v1\"");
    }

    #[test]
    fn test_return_content_type_only() {
        let mut upstream = HeaderMap::new();
        upstream.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        upstream.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );

        let f = filter(ForwardHeaderPolicy::All, RelayMode::DecodeJson);
        let out = f.returned(&upstream);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out.get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );

        let out = f.returned(&HeaderMap::new());
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_connection_info_uses_host_header() {
        let (parts, _) = Request::builder()
            .uri("/api/v1/anime/home")
            .header(header::HOST, "gateway.local:8080")
            .body(())
            .unwrap()
            .into_parts();

        let info = ConnectionInfo::from_parts("127.0.0.1".parse().unwrap(), &parts);
        assert_eq!(info.host.unwrap(), "gateway.local:8080");
        assert_eq!(info.scheme, "http");
    }
}
