//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Inbound timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Upstream content API definitions.
    pub backends: Vec<BackendConfig>,

    /// Settings for the arbitrary-URL image fetcher.
    pub image_proxy: ImageProxyConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    /// Cross-origin policy for responses whose headers the gateway owns.
    pub cors: CorsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How the upstream response is turned into the client response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Status, headers and body are copied through as they arrive.
    #[default]
    Stream,
    /// JSON bodies are parsed and re-encoded by the gateway.
    DecodeJson,
}

/// Which inbound headers are sent to the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardHeaderPolicy {
    /// Every end-to-end header, with `X-Forwarded-*` rewritten by the gateway.
    #[default]
    All,
    /// Only the named headers (case-insensitive).
    AllowList(Vec<String>),
}

/// Which upstream headers are sent back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnHeaderPolicy {
    /// Every upstream header, verbatim.
    All,
    /// Only a `Content-Type` chosen by the gateway.
    ContentTypeOnly,
}

/// Upstream content API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier, also used in the default route prefix.
    pub name: String,

    /// Upstream base URL (e.g., "http://localhost:3001").
    #[serde(default)]
    pub base_url: String,

    /// Gateway path prefix this backend is mounted at.
    /// Defaults to `/api/v1/<name>`.
    #[serde(default)]
    pub route_prefix: Option<String>,

    /// Prefix removed from inbound paths. Defaults to the route prefix.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Prefix prepended to the upstream path (e.g., "/otakudesu").
    #[serde(default)]
    pub add_prefix: String,

    /// Upstream round-trip timeout in seconds (connect + transfer).
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Whether the backend client follows upstream redirects.
    #[serde(default)]
    pub follow_redirects: bool,

    #[serde(default)]
    pub relay_mode: RelayMode,

    #[serde(default)]
    pub forward_headers: ForwardHeaderPolicy,

    /// Defaults from `relay_mode` when omitted.
    #[serde(default)]
    pub return_headers: Option<ReturnHeaderPolicy>,

    /// Mount the image fetcher under this backend's prefix.
    #[serde(default)]
    pub assets: bool,

    /// Upstream calls in flight at once; further requests to this backend wait.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_max_concurrent_requests() -> usize {
    1024
}

impl BackendConfig {
    /// Create a backend with default policies (stream relay, forward all headers).
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            route_prefix: None,
            strip_prefix: None,
            add_prefix: String::new(),
            timeout_secs: default_backend_timeout(),
            follow_redirects: false,
            relay_mode: RelayMode::Stream,
            forward_headers: ForwardHeaderPolicy::All,
            return_headers: None,
            assets: false,
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }

    /// Gateway path prefix, falling back to `/api/v1/<name>`.
    pub fn route_prefix(&self) -> String {
        self.route_prefix
            .clone()
            .unwrap_or_else(|| format!("/api/v1/{}", self.name))
    }

    /// Prefix removed before rewriting, falling back to the route prefix.
    pub fn strip_prefix(&self) -> String {
        self.strip_prefix
            .clone()
            .unwrap_or_else(|| self.route_prefix())
    }

    pub fn return_headers(&self) -> ReturnHeaderPolicy {
        self.return_headers.unwrap_or(match self.relay_mode {
            RelayMode::Stream => ReturnHeaderPolicy::All,
            RelayMode::DecodeJson => ReturnHeaderPolicy::ContentTypeOnly,
        })
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for producing a response to the client, in seconds.
    /// Should exceed every backend timeout so upstream timeouts surface as 502.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Image fetcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageProxyConfig {
    /// Round-trip timeout for third-party hosts, in seconds.
    pub timeout_secs: u64,

    /// Maximum redirects followed per fetch.
    pub max_redirects: usize,

    /// Browser-like User-Agent sent to third-party hosts.
    pub user_agent: String,

    /// Browser-like Accept header for image requests.
    pub accept: String,

    /// `max-age` of the Cache-Control header attached to fetched images.
    pub cache_max_age_secs: u64,
}

impl Default for ImageProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_redirects: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept: "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8".to_string(),
            cache_max_age_secs: 86_400,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries. Off by default: one upstream attempt per request.
    pub enabled: bool,

    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Cross-origin configuration.
///
/// Applied to cross-origin requests whose response headers are chosen by the
/// gateway: `content_type_only` backends and the image route. Backends that
/// return upstream headers verbatim stay the authority for their own CORS.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Exact origins, or `"*"` for any. Empty allows none.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_defaults() {
        let backend = BackendConfig::new("anime", "http://localhost:3001");
        assert_eq!(backend.route_prefix(), "/api/v1/anime");
        assert_eq!(backend.strip_prefix(), "/api/v1/anime");
        assert_eq!(backend.timeout_secs, 30);
        assert_eq!(backend.max_concurrent_requests, 1024);
        assert_eq!(backend.return_headers(), ReturnHeaderPolicy::All);
    }

    #[test]
    fn test_cors_defaults_and_parsing() {
        let config = GatewayConfig::default();
        assert!(config.cors.enabled);
        assert_eq!(config.cors.allowed_origins, vec!["*"]);

        let config: GatewayConfig = toml::from_str(
            r#"
            [cors]
            allowed_origins = ["https://nanonime.example"]
            "#,
        )
        .unwrap();
        assert!(config.cors.enabled);
        assert_eq!(config.cors.allowed_origins, vec!["https://nanonime.example"]);
    }

    #[test]
    fn test_return_headers_follow_relay_mode() {
        let mut backend = BackendConfig::new("manga", "http://localhost:3002");
        backend.relay_mode = RelayMode::DecodeJson;
        assert_eq!(backend.return_headers(), ReturnHeaderPolicy::ContentTypeOnly);

        backend.return_headers = Some(ReturnHeaderPolicy::All);
        assert_eq!(backend.return_headers(), ReturnHeaderPolicy::All);
    }

    #[test]
    fn test_parse_backend_policies_from_toml() {
        let raw = r#"
            [[backends]]
            name = "anime"
            base_url = "http://localhost:3001"
            add_prefix = "/otakudesu"
            assets = true

            [[backends]]
            name = "manga"
            base_url = "http://localhost:3002"
            add_prefix = "/api/manga"
            relay_mode = "decode_json"
            forward_headers = { allow_list = ["Authorization", "Content-Type"] }
        "#;

        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.backends.len(), 2);

        let anime = &config.backends[0];
        assert_eq!(anime.relay_mode, RelayMode::Stream);
        assert_eq!(anime.forward_headers, ForwardHeaderPolicy::All);
        assert!(anime.assets);

        let manga = &config.backends[1];
        assert_eq!(manga.relay_mode, RelayMode::DecodeJson);
        assert_eq!(
            manga.forward_headers,
            ForwardHeaderPolicy::AllowList(vec!["Authorization".into(), "Content-Type".into()])
        );
        assert_eq!(manga.return_headers(), ReturnHeaderPolicy::ContentTypeOnly);
        assert!(!manga.assets);
    }
}
