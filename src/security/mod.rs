//! Security subsystem: the admission gates.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → method.rs (allowed HTTP methods)
//!     → uri.rs (allowed paths, exact or prefix)
//!     → limits.rs (declared and actual body size)
//!     → signature.rs (timestamp freshness + HMAC over the body)
//!     → Pass to forwarder
//! ```
//!
//! # Design Decisions
//! - Cheap checks first: body buffering and HMAC are paid only by plausible requests
//! - Fail closed: every gate answers with a terminal rejection
//! - An unconfigured gate is left out of the chain, never installed as a no-op
//! - Policy and secrets are immutable after startup and shared without locks

pub mod headers;
pub mod limits;
pub mod method;
pub mod signature;
pub mod uri;

use crate::config::PolicyConfig;

/// Request admission policy, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Exact, case-sensitive method names. Empty omits the method gate.
    pub allowed_methods: Vec<String>,
    /// Exact paths or `/`-terminated prefixes. Empty omits the path gate.
    pub allowed_paths: Vec<String>,
    /// Body byte ceiling. Zero omits the body limiter.
    pub max_body_bytes: u64,
}

impl From<&PolicyConfig> for AccessPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            allowed_methods: config.allowed_methods.clone(),
            allowed_paths: config.allowed_paths.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}
