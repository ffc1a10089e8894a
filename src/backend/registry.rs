//! Immutable table of upstream content APIs.
//!
//! # Responsibilities
//! - Build one `Backend` per configured upstream at startup
//! - Own one pooled HTTP client and one admission semaphore per backend
//! - Look up a backend by name or by the route prefix of an inbound path
//!
//! # Design Decisions
//! - Immutable after construction (shared via Arc, read without locks)
//! - Longest route prefix wins when prefixes nest
//! - A saturated backend only queues its own requests; nothing is shared
//! - Any invalid entry fails the whole registry (fail fast at startup)

use reqwest::redirect;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

use crate::config::{BackendConfig, RelayMode, ReturnHeaderPolicy};
use crate::proxy::headers::HeaderFilter;
use crate::proxy::rewrite::PathRewriter;

/// Redirect hops a backend client follows when `follow_redirects` is set.
const BACKEND_MAX_REDIRECTS: usize = 10;

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no backends configured")]
    Empty,

    #[error("{0} base url not found")]
    MissingBaseUrl(String),

    #[error("duplicate backend '{0}'")]
    Duplicate(String),

    #[error("backend '{backend}': invalid forward header name: {source}")]
    InvalidHeaderName {
        backend: String,
        #[source]
        source: axum::http::header::InvalidHeaderName,
    },

    #[error("backend '{backend}': failed to build HTTP client: {source}")]
    Client {
        backend: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A single upstream content API with its compiled policies.
#[derive(Debug)]
pub struct Backend {
    config: BackendConfig,
    route_prefix: String,
    rewriter: PathRewriter,
    headers: HeaderFilter,
    client: reqwest::Client,
    in_flight: Semaphore,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Result<Self, RegistryError> {
        if config.base_url.trim().is_empty() {
            return Err(RegistryError::MissingBaseUrl(config.name.clone()));
        }

        let headers = HeaderFilter::from_config(&config).map_err(|source| {
            RegistryError::InvalidHeaderName {
                backend: config.name.clone(),
                source,
            }
        })?;

        let redirect_policy = if config.follow_redirects {
            redirect::Policy::limited(BACKEND_MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect_policy)
            .no_proxy()
            .build()
            .map_err(|source| RegistryError::Client {
                backend: config.name.clone(),
                source,
            })?;

        Ok(Self {
            route_prefix: config.route_prefix(),
            rewriter: PathRewriter::from_config(&config),
            headers,
            client,
            in_flight: Semaphore::new(config.max_concurrent_requests),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    pub fn relay_mode(&self) -> RelayMode {
        self.config.relay_mode
    }

    pub fn rewriter(&self) -> &PathRewriter {
        &self.rewriter
    }

    pub fn headers(&self) -> &HeaderFilter {
        &self.headers
    }

    /// Pooled client for this backend; redirects are not followed unless configured.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Wait for a free upstream slot on this backend. Other backends are unaffected.
    pub async fn admit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        if let Ok(permit) = self.in_flight.try_acquire() {
            return Ok(permit);
        }
        tracing::debug!(
            backend = %self.name(),
            limit = self.config.max_concurrent_requests,
            "Backend at concurrency limit, queueing request"
        );
        self.in_flight.acquire().await
    }

    pub fn available_slots(&self) -> usize {
        self.in_flight.available_permits()
    }

    /// Whether response headers are chosen by the gateway rather than the upstream.
    pub fn owns_response_headers(&self) -> bool {
        self.config.return_headers() == ReturnHeaderPolicy::ContentTypeOnly
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Whether the image fetcher is mounted under this backend.
    pub fn serves_assets(&self) -> bool {
        self.config.assets
    }

    /// True if `path` is the route prefix itself or lies beneath it.
    pub fn owns(&self, path: &str) -> bool {
        if self.route_prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.route_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Read-only backend table shared by every request.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    by_name: HashMap<String, usize>,
}

impl BackendRegistry {
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, RegistryError> {
        if configs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut backends = Vec::with_capacity(configs.len());
        let mut by_name = HashMap::with_capacity(configs.len());

        for config in configs {
            let backend = Backend::new(config.clone())?;
            if by_name
                .insert(backend.name().to_string(), backends.len())
                .is_some()
            {
                return Err(RegistryError::Duplicate(backend.name().to_string()));
            }

            tracing::info!(
                backend = %backend.name(),
                base_url = %backend.base_url(),
                route_prefix = %backend.route_prefix(),
                relay_mode = ?backend.relay_mode(),
                timeout_secs = config.timeout_secs,
                "Backend registered"
            );
            backends.push(Arc::new(backend));
        }

        Ok(Self { backends, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Backend>> {
        self.by_name.get(name).map(|&i| &self.backends[i])
    }

    /// Find the backend whose route prefix owns `path` (longest prefix wins).
    pub fn resolve(&self, path: &str) -> Option<&Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| b.owns(path))
            .max_by_key(|b| b.route_prefix().len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Backend>> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
