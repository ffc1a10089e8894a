//! Retry eligibility.
//!
//! Non-idempotent methods are never retried, even on connect failures: the
//! gateway cannot tell whether the upstream acted on a request whose
//! connection broke mid-flight.

use axum::http::Method;

use crate::config::RetryConfig;

/// Total attempts allowed for `method` under `config` (at least one).
pub fn max_attempts(config: &RetryConfig, method: &Method) -> u32 {
    if config.enabled && method.is_idempotent() {
        config.max_attempts.max(1)
    } else {
        1
    }
}

/// Whether a failed attempt may be repeated.
pub fn is_retryable(method: &Method, error: &reqwest::Error) -> bool {
    method.is_idempotent() && (error.is_connect() || error.is_timeout())
}
