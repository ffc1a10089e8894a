//! Request-path error taxonomy.
//!
//! Every per-request failure the gateway originates is one of these variants
//! and renders as a JSON object with at least an `error` string. Failures
//! after the status line is committed never reach this type; they are logged
//! by the relay and end the connection instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors produced while handling a single proxied request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed client input. No network call was attempted.
    #[error("{error}")]
    ClientInput { error: &'static str },

    /// The gateway could not build its own URL or request.
    #[error("{error}: {message}")]
    Construction { error: &'static str, message: String },

    /// Connection, timeout or other transport failure talking to the upstream.
    #[error("{error}: {message}")]
    UpstreamUnreachable { error: String, message: String },

    /// The upstream answered, but not with something the gateway can relay.
    #[error("{error}")]
    UpstreamProtocol {
        error: &'static str,
        code: Option<u16>,
    },

    /// The inbound deadline elapsed before response headers were ready.
    #[error("Request timed out")]
    Deadline,
}

/// JSON body of a gateway-originated error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ClientInput { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Construction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamUnreachable { .. } | GatewayError::UpstreamProtocol { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Deadline => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            GatewayError::ClientInput { error } => ErrorBody {
                error: (*error).to_string(),
                message: None,
                code: None,
            },
            GatewayError::Construction { error, message } => ErrorBody {
                error: (*error).to_string(),
                message: Some(message.clone()),
                code: None,
            },
            GatewayError::UpstreamUnreachable { error, message } => ErrorBody {
                error: error.clone(),
                message: Some(message.clone()),
                code: None,
            },
            GatewayError::UpstreamProtocol { error, code } => ErrorBody {
                error: (*error).to_string(),
                message: None,
                code: *code,
            },
            GatewayError::Deadline => ErrorBody {
                error: "Request timed out".to_string(),
                message: None,
                code: None,
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Full transport error text, including every source in the chain.
pub fn transport_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Render a JSON 404 for paths outside every backend prefix.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "No matching route found".to_string(),
            message: None,
            code: None,
        }),
    )
        .into_response()
}
