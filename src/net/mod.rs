//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! configured addresses
//!     → listener.rs (bind all, fail fast)
//!     → tls.rs (optional PEM certificate for the TLS listeners)
//!     → idle.rs (close connections that stay quiet too long)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Every listener is bound before any of them serves
//! - TLS is optional and handled transparently by axum-server

pub mod idle;
pub mod listener;
pub mod tls;
