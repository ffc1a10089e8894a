//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every proxied call logs method, source path, target URL and outcome
//! - Request ID (x-request-id) is attached to the HTTP span by tower-http
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
