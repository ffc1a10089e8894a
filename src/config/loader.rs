//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[backends]]
            name = "anime"
            base_url = "http://localhost:3001"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.backends[0].timeout_secs, 30);
        assert_eq!(config.image_proxy.cache_max_age_secs, 86_400);
        assert!(!config.retries.enabled);
    }

    #[test]
    fn test_validation_failure_lists_every_error() {
        let err = parse_config(
            r#"
            [[backends]]
            name = "anime"

            [[backends]]
            name = "manga"
            base_url = "http://localhost:3002"
            timeout_secs = 0
            "#,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Validation failed: "));
        assert!(message.contains("backend 'anime': base_url is required"));
        assert!(message.contains("backend 'manga': timeout_secs must be greater than zero"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../../gateway.example.toml")).unwrap();
        assert_eq!(config.backends.len(), 5);
        assert!(config.backends[0].assets);
        assert!(!config.backends[0].follow_redirects);
        assert_eq!(config.backends[0].max_concurrent_requests, 256);
        assert_eq!(config.backends[1].relay_mode, crate::config::RelayMode::DecodeJson);
        assert!(config.backends.iter().all(|b| !b.follow_redirects));
        assert_eq!(config.cors.allowed_origins, vec!["*"]);
    }
}
