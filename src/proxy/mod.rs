//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (path, query, headers, body)
//!     → dispatch.rs (resolve backend, retry policy)
//!     → rewrite.rs (strip / add prefix → target URL)
//!     → headers.rs (forward-all or allow-list, X-Forwarded-*)
//!     → reqwest client of the backend
//!     → relay.rs (Stream or DecodeJson)
//!     → Client response
//!
//! GET <prefix>/image?url=
//!     → image.rs (validate, spoof Referer, fetch)
//!     → relay.rs (stream with gateway Cache-Control)
//! ```
//!
//! # Design Decisions
//! - One generic dispatcher; backends differ only by configuration
//! - Status is committed only after the first upstream body chunk arrives
//! - Failures after commit abort the connection; no second status is sent
//! - Hop-by-hop headers never cross the gateway in either direction

pub mod dispatch;
pub mod headers;
pub mod image;
pub mod relay;
pub mod rewrite;

pub use dispatch::Dispatcher;
pub use headers::{ConnectionInfo, HeaderFilter};
pub use image::{ImageFetchProxy, ImageProxyError};
pub use relay::{RelayState, ResponseRelay};
pub use rewrite::{PathRewriter, TargetUrlError};
