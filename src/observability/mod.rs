//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → one span per request carrying a request_id (server.rs)
//!
//! Consumers:
//!     → logging.rs (stdout, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID lives in the span only; forwarded traffic is not modified
//! - Secrets and signatures are never recorded

pub mod logging;
