//! Startup orchestration.
//!
//! # Responsibilities
//! - Surface configuration warnings
//! - Build the backend registry and the image fetcher
//! - Assemble the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;
use thiserror::Error;

use crate::backend::{BackendRegistry, RegistryError};
use crate::config::{validation::config_warnings, GatewayConfig};
use crate::http::HttpServer;
use crate::proxy::{ImageFetchProxy, ImageProxyError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ImageProxy(#[from] ImageProxyError),
}

/// Build a ready-to-run server from an already validated config.
pub fn build_server(config: &GatewayConfig) -> Result<HttpServer, StartupError> {
    for warning in config_warnings(config) {
        tracing::warn!(warning = %warning, "Configuration warning");
    }

    let registry = Arc::new(BackendRegistry::from_config(&config.backends)?);
    let images = Arc::new(ImageFetchProxy::new(&config.image_proxy)?);

    tracing::info!(
        backends = registry.len(),
        request_timeout_secs = config.timeouts.request_secs,
        retries = config.retries.enabled,
        "Gateway initialized"
    );

    Ok(HttpServer::new(config, registry, images))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    #[test]
    fn test_build_server() {
        let mut config = GatewayConfig::default();
        config.backends = vec![
            BackendConfig::new("anime", "http://localhost:3001"),
            BackendConfig::new("manga", "http://localhost:3002"),
        ];
        let server = build_server(&config).unwrap();
        assert_eq!(server.registry().len(), 2);
    }

    #[test]
    fn test_empty_registry_is_fatal() {
        let err = build_server(&GatewayConfig::default()).err().unwrap();
        assert!(matches!(err, StartupError::Registry(RegistryError::Empty)));
    }
}
