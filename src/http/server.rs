//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router: per-backend health and image routes, catch-all proxy
//! - Wire up middleware (request id, tracing, deadline, body limit)
//! - Apply CORS to responses whose headers the gateway owns
//! - Bind server to listener and serve until shutdown

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, Query, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get},
    BoxError, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, request_id::SetRequestIdLayer,
    trace::TraceLayer,
};

use crate::backend::{Backend, BackendRegistry};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::{HealthProbe, HealthReport};
use crate::http::cors;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::observability::metrics;
use crate::proxy::{Dispatcher, ImageFetchProxy};

/// State of the catch-all proxy route.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub cors: Option<CorsLayer>,
}

/// State of one backend's fixed routes.
#[derive(Clone)]
pub struct BackendState {
    pub backend: Arc<Backend>,
    pub images: Arc<ImageFetchProxy>,
    pub cors: Option<CorsLayer>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    registry: Arc<BackendRegistry>,
}

impl HttpServer {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<BackendRegistry>,
        images: Arc<ImageFetchProxy>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            config.retries.clone(),
            config.security.max_body_size,
        ));
        let cors = cors::build_cors_layer(&config.cors);
        let router = Self::build_router(config, &registry, images, AppState { dispatcher, cors });
        Self { router, registry }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &GatewayConfig,
        registry: &BackendRegistry,
        images: Arc<ImageFetchProxy>,
        state: AppState,
    ) -> Router {
        let cors = state.cors.clone();
        let mut router = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state);

        for backend in registry.iter() {
            router = router.merge(backend_routes(backend.clone(), images.clone(), cors.clone()));
        }

        router
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(deadline_elapsed))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %request_id(request),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.registry.len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `{prefix}/health` and, for asset-serving backends, `{prefix}/image`.
fn backend_routes(
    backend: Arc<Backend>,
    images: Arc<ImageFetchProxy>,
    cors: Option<CorsLayer>,
) -> Router {
    let base = match backend.route_prefix() {
        "/" => "",
        prefix => prefix,
    };

    let mut router = Router::new().route(&format!("{base}/health"), get(health_handler));
    if backend.serves_assets() {
        router = router.route(&format!("{base}/image"), get(image_handler));
    }
    router.with_state(BackendState {
        backend,
        images,
        cors,
    })
}

/// Map the inbound deadline to a JSON 504. Inner services never fail otherwise.
async fn deadline_elapsed(err: BoxError) -> GatewayError {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request deadline elapsed before response headers");
        GatewayError::Deadline
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        GatewayError::Construction {
            error: "Unhandled internal error",
            message: err.to_string(),
        }
    }
}

async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let owned = cors::is_cross_origin(&request)
        && state
            .dispatcher
            .route(request.uri().path())
            .is_some_and(|backend| backend.owns_response_headers());

    match state.cors.as_ref().filter(|_| owned) {
        Some(layer) => {
            let dispatcher = state.dispatcher.clone();
            cors::apply(layer, request, move |request| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.dispatch(peer, request).await }
            })
            .await
        }
        None => state.dispatcher.dispatch(peer, request).await,
    }
}

async fn health_handler(State(state): State<BackendState>) -> HealthReport {
    HealthProbe::new(&state.backend).check().await
}

#[derive(Debug, Deserialize)]
struct ImageParams {
    url: Option<String>,
}

async fn image_handler(State(state): State<BackendState>, request: Request<Body>) -> Response {
    match state.cors.as_ref().filter(|_| cors::is_cross_origin(&request)) {
        Some(layer) => {
            let images = state.images.clone();
            cors::apply(layer, request, move |request| {
                let images = images.clone();
                let url = image_url(&request);
                async move { fetch_image(&images, url.as_deref()).await }
            })
            .await
        }
        None => fetch_image(&state.images, image_url(&request).as_deref()).await,
    }
}

/// The `url` query parameter. A malformed query counts as missing.
fn image_url<B>(request: &Request<B>) -> Option<String> {
    Query::<ImageParams>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(params)| params.url)
}

async fn fetch_image(images: &ImageFetchProxy, url: Option<&str>) -> Response {
    match images.fetch(url).await {
        Ok(response) => {
            metrics::record_image_fetch("ok");
            response
        }
        Err(e) => {
            metrics::record_image_fetch(if e.status().is_client_error() {
                "rejected"
            } else {
                "failed"
            });
            e.into_response()
        }
    }
}
