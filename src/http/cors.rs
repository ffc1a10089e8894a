//! Cross-origin handling.
//!
//! CORS is applied per response, not as a router layer: stream-mode backends
//! return upstream headers verbatim, including the upstream's own CORS
//! headers, so only responses whose headers the gateway chooses get a policy.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    response::Response,
};
use std::convert::Infallible;
use std::future::Future;
use tower::{service_fn, Layer, ServiceExt};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;

/// Build the policy, or `None` when CORS is disabled.
pub fn build_cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        tracing::info!("CORS disabled");
        return None;
    }

    if config.allowed_origins.iter().any(|o| o == "*") {
        tracing::info!("CORS configured to allow all origins (permissive mode)");
        return Some(CorsLayer::permissive());
    }

    if config.allowed_origins.is_empty() {
        tracing::info!("CORS configured with no allowed origins (most restrictive)");
        return Some(CorsLayer::new());
    }

    tracing::info!(
        allowed_origins = ?config.allowed_origins,
        "CORS configured with origin allowlist"
    );

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
                Method::PATCH,
            ])
            .allow_headers(Any),
    )
}

/// Whether a cross-origin policy applies to this request at all.
pub fn is_cross_origin<B>(request: &Request<B>) -> bool {
    request.headers().contains_key(header::ORIGIN)
}

/// Run `handler` behind `cors`. Preflights are answered without calling it.
pub async fn apply<F, Fut>(cors: &CorsLayer, request: Request<Body>, mut handler: F) -> Response
where
    F: FnMut(Request<Body>) -> Fut,
    Fut: Future<Output = Response>,
{
    let inner = service_fn(move |request: Request<Body>| {
        let response = handler(request);
        async move { Ok::<_, Infallible>(response.await) }
    });

    cors.layer(inner)
        .oneshot(request)
        .await
        .unwrap_or_else(|e| match e {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn ok_handler(_request: Request<Body>) -> impl Future<Output = Response> {
        async { Response::new(Body::from("ok")) }
    }

    fn origins(list: &[&str]) -> CorsConfig {
        CorsConfig {
            enabled: true,
            allowed_origins: list.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_disabled_builds_nothing() {
        let config = CorsConfig {
            enabled: false,
            ..CorsConfig::default()
        };
        assert!(build_cors_layer(&config).is_none());
    }

    #[tokio::test]
    async fn test_wildcard_allows_any_origin() {
        let cors = build_cors_layer(&CorsConfig::default()).unwrap();
        let request = Request::builder()
            .header(header::ORIGIN, "https://reader.example")
            .body(Body::empty())
            .unwrap();

        let response = apply(&cors, request, ok_handler).await;

        let allowed: Vec<_> = response
            .headers()
            .get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .iter()
            .collect();
        assert_eq!(allowed, vec!["*"]);
    }

    #[tokio::test]
    async fn test_allowlist_echoes_listed_origin_only() {
        let cors = build_cors_layer(&origins(&["https://reader.example"])).unwrap();

        let listed = Request::builder()
            .header(header::ORIGIN, "https://reader.example")
            .body(Body::empty())
            .unwrap();
        let response = apply(&cors, listed, ok_handler).await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://reader.example"
        );

        let other = Request::builder()
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = apply(&cors, other, ok_handler).await;
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_preflight_is_answered_without_handler() {
        let cors = build_cors_layer(&CorsConfig::default()).unwrap();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .header(header::ORIGIN, "https://reader.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();

        let response = apply(&cors, request, |_request: Request<Body>| async {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::IM_A_TEAPOT;
            response
        })
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[test]
    fn test_cross_origin_requires_origin_header() {
        assert!(!is_cross_origin(&Request::new(Body::empty())));
        let request = Request::builder()
            .header(header::ORIGIN, "https://reader.example")
            .body(())
            .unwrap();
        assert!(is_cross_origin(&request));
    }
}
