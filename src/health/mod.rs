//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET <prefix>/health
//!     → probe.rs (GET {base_url}/health on the backend's own client)
//!     → HealthReport (up / down / error)
//!     → JSON response + gateway_backend_up gauge
//! ```
//!
//! # Design Decisions
//! - On demand only; no background probing and no cached state
//! - Reachability is the signal: any upstream status, even 5xx, counts as up
//! - Bypasses path rewriting and header policy

pub mod probe;

pub use probe::{HealthProbe, HealthReport};
