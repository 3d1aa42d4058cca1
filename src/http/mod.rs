//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, tracing span per request, connection limits)
//!     → deadline.rs (whole response within the write timeout)
//!     → chain.rs (method → uri → body limit → signature)
//!     → forward.rs (rewrite onto the upstream, relay the response)
//!     → Send to client
//!
//! Any gate may stop the request early:
//!     → response.rs (status code + plain-text page)
//!
//! Plain HTTP listeners next to TLS ones:
//!     → redirect.rs (301 to https, never forwarded)
//! ```

pub mod chain;
pub mod deadline;
pub mod forward;
pub mod redirect;
pub mod response;
pub mod server;

pub use chain::AdmissionChain;
pub use forward::ProxyForwarder;
pub use response::Rejection;
pub use server::GatewayServer;
