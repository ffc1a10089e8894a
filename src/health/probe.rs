//! On-demand backend reachability probe.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use url::Url;

use crate::backend::Backend;
use crate::error::transport_message;
use crate::observability::metrics;

const HEALTH_PATH: &str = "/health";

/// Outcome of a single probe, serialized as the health route's body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthReport {
    Up {
        api_url: String,
        code: u16,
    },
    Down {
        api_url: String,
        error: String,
        message: String,
    },
    Error {
        error: String,
    },
}

impl HealthReport {
    pub fn status(&self) -> StatusCode {
        match self {
            HealthReport::Up { .. } => StatusCode::OK,
            HealthReport::Down { .. } => StatusCode::SERVICE_UNAVAILABLE,
            HealthReport::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, HealthReport::Up { .. })
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Probes one backend's `/health` endpoint.
pub struct HealthProbe<'a> {
    backend: &'a Backend,
}

impl<'a> HealthProbe<'a> {
    pub fn new(backend: &'a Backend) -> Self {
        Self { backend }
    }

    /// `{base_url}/health`, ignoring the rewrite rule.
    pub fn probe_url(&self) -> Result<Url, url::ParseError> {
        let base = self.backend.base_url().trim_end_matches('/');
        Url::parse(&format!("{base}{HEALTH_PATH}"))
    }

    pub async fn check(&self) -> HealthReport {
        let name = self.backend.name();
        let api_url = self.backend.base_url().to_string();

        let request = match self
            .probe_url()
            .map_err(|e| e.to_string())
            .and_then(|url| self.backend.client().get(url).build().map_err(|e| e.to_string()))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(backend = %name, error = %e, "Failed to create health check request");
                return HealthReport::Error {
                    error: "Failed to create health check request".to_string(),
                };
            }
        };

        let report = match self.backend.client().execute(request).await {
            Ok(response) => {
                let code = response.status().as_u16();
                tracing::debug!(backend = %name, code, "Health check reached backend");
                HealthReport::Up { api_url, code }
            }
            Err(e) => {
                let message = transport_message(&e);
                tracing::warn!(backend = %name, error = %message, "Health check failed: backend unreachable");
                HealthReport::Down {
                    api_url,
                    error: format!("{name} API is not reachable"),
                    message,
                }
            }
        };

        metrics::record_backend_health(name, report.is_up());
        report
    }
}
