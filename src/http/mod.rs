//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request id)
//!     → per-backend routes: health, image
//!     → catch-all → proxy::Dispatcher
//!     → cors.rs (only when the gateway owns the response headers)
//!     → Send to client
//! ```

pub mod cors;
pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, BackendState, HttpServer};
