//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, URLs parse)
//! - Detect conflicting backends (duplicate names or route prefixes)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::{
    BackendConfig, ForwardHeaderPolicy, GatewayConfig, RelayMode, ReturnHeaderPolicy,
};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend #{0} has an empty name")]
    EmptyName(usize),

    #[error("duplicate backend name '{0}'")]
    DuplicateName(String),

    #[error("backend '{0}': base_url is required")]
    MissingBaseUrl(String),

    #[error("backend '{backend}': invalid base_url '{url}' ({reason})")]
    InvalidBaseUrl {
        backend: String,
        url: String,
        reason: String,
    },

    #[error("backend '{backend}': {field} '{value}' must start with '/' and not end with '/'")]
    InvalidPrefix {
        backend: String,
        field: &'static str,
        value: String,
    },

    #[error("route prefix '{0}' is used by more than one backend")]
    DuplicateRoutePrefix(String),

    #[error("backend '{0}': timeout_secs must be greater than zero")]
    ZeroTimeout(String),

    #[error("backend '{0}': max_concurrent_requests must be greater than zero")]
    ZeroConcurrency(String),

    #[error("backend '{0}': forward_headers allow_list is empty")]
    EmptyAllowList(String),

    #[error("backend '{0}': relay_mode decode_json requires return_headers content_type_only")]
    DecodeWithAllHeaders(String),

    #[error("image_proxy.timeout_secs must be greater than zero")]
    ZeroImageTimeout,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("cors.allowed_origins entry '{0}' is not an http(s) origin")]
    InvalidCorsOrigin(String),
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();

    for (index, backend) in config.backends.iter().enumerate() {
        if backend.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName(index));
        } else if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateName(backend.name.clone()));
        }

        validate_backend(backend, &mut errors);

        let prefix = backend.route_prefix();
        if !prefixes.insert(prefix.clone()) {
            errors.push(ValidationError::DuplicateRoutePrefix(prefix));
        }
    }

    if config.image_proxy.timeout_secs == 0 {
        errors.push(ValidationError::ZeroImageTimeout);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    for origin in &config.cors.allowed_origins {
        if origin != "*" && !is_origin(origin) {
            errors.push(ValidationError::InvalidCorsOrigin(origin.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(backend: &BackendConfig, errors: &mut Vec<ValidationError>) {
    let name = backend.name.clone();

    if backend.base_url.trim().is_empty() {
        errors.push(ValidationError::MissingBaseUrl(name.clone()));
    } else {
        match Url::parse(&backend.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::InvalidBaseUrl {
                backend: name.clone(),
                url: backend.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidBaseUrl {
                backend: name.clone(),
                url: backend.base_url.clone(),
                reason: e.to_string(),
            }),
        }
    }

    for (field, value) in [
        ("route_prefix", backend.route_prefix()),
        ("strip_prefix", backend.strip_prefix()),
    ] {
        if !is_valid_prefix(&value) {
            errors.push(ValidationError::InvalidPrefix {
                backend: name.clone(),
                field,
                value,
            });
        }
    }
    if !backend.add_prefix.is_empty() && !is_valid_prefix(&backend.add_prefix) {
        errors.push(ValidationError::InvalidPrefix {
            backend: name.clone(),
            field: "add_prefix",
            value: backend.add_prefix.clone(),
        });
    }

    if backend.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout(name.clone()));
    }
    if backend.max_concurrent_requests == 0 {
        errors.push(ValidationError::ZeroConcurrency(name.clone()));
    }

    if let ForwardHeaderPolicy::AllowList(list) = &backend.forward_headers {
        if list.is_empty() {
            errors.push(ValidationError::EmptyAllowList(name.clone()));
        }
    }

    if backend.relay_mode == RelayMode::DecodeJson
        && backend.return_headers() == ReturnHeaderPolicy::All
    {
        errors.push(ValidationError::DecodeWithAllHeaders(name));
    }
}

/// `scheme://host[:port]` with nothing after it.
fn is_origin(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.has_host()
                && url.origin().ascii_serialization() == raw
        }
        Err(_) => false,
    }
}

/// Absolute, no trailing slash, no empty segments, no route syntax.
fn is_valid_prefix(prefix: &str) -> bool {
    prefix.starts_with('/')
        && (prefix.len() == 1 || !prefix.ends_with('/'))
        && !prefix.contains("//")
        && !prefix.contains(['{', '}', '*', '?', '#'])
}

/// Non-fatal configuration smells, logged at startup.
pub fn config_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    for backend in &config.backends {
        if config.image_proxy.timeout_secs >= backend.timeout_secs {
            warnings.push(format!(
                "image_proxy.timeout_secs ({}) is not shorter than backend '{}' timeout ({})",
                config.image_proxy.timeout_secs, backend.name, backend.timeout_secs
            ));
        }
        if config.timeouts.request_secs <= backend.timeout_secs {
            warnings.push(format!(
                "timeouts.request_secs ({}) does not exceed backend '{}' timeout ({}); \
                 upstream timeouts will surface as 408",
                config.timeouts.request_secs, backend.name, backend.timeout_secs
            ));
        }
    }
    warnings
}
