//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call fails with a transport error:
//!     → retries.rs (idempotent method? transient error? attempts left?)
//!     → backoff.rs (exponential delay with jitter)
//!     → one more attempt, or the error is surfaced as 502
//! ```
//!
//! # Design Decisions
//! - Retries are opt-in; the default is exactly one upstream attempt
//! - Only idempotent methods, only connect/timeout failures
//! - An upstream that answered (any status) is never retried
//! - Timeouts live on the clients themselves (per-backend round-trip bound)

pub mod backoff;
pub mod retries;
