//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! BackendConfig[] (validated)
//!     → registry.rs (compile rewrite rule, header policy, client)
//!     → BackendRegistry (frozen, Arc-shared)
//!     → handlers resolve inbound path → Backend
//! ```
//!
//! # Design Decisions
//! - One connection pool per backend, reused by every request to it
//! - Policies are compiled once; nothing varies per request

pub mod registry;

pub use registry::{Backend, BackendRegistry, RegistryError};
