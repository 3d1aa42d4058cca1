//! Admission chain assembly.
//!
//! # Data Flow
//! ```text
//! request → MethodGate → UriGate → BodyLimiter → SignatureVerifier → terminal
//! ```
//!
//! Unconfigured gates are absent, not permissive. Any rejection ends the
//! request; the terminal handler only ever sees verified requests.

use axum::{middleware, Router};
use std::sync::Arc;

use crate::security::{
    limits::{limit_body, BodyLimiter},
    method::{restrict_method, MethodGate},
    signature::{verify_signature, SignatureVerifier},
    uri::{restrict_uri, UriGate},
    AccessPolicy,
};

/// The ordered set of gates in front of the forwarder.
#[derive(Debug, Clone)]
pub struct AdmissionChain {
    method: Option<Arc<MethodGate>>,
    uri: Option<Arc<UriGate>>,
    body: Option<Arc<BodyLimiter>>,
    signature: Arc<SignatureVerifier>,
}

impl AdmissionChain {
    pub fn new(policy: &AccessPolicy, verifier: SignatureVerifier) -> Self {
        Self {
            method: MethodGate::new(&policy.allowed_methods).map(Arc::new),
            uri: UriGate::new(&policy.allowed_paths).map(Arc::new),
            body: BodyLimiter::new(policy.max_body_bytes).map(Arc::new),
            signature: Arc::new(verifier),
        }
    }

    /// Names of the installed stages, outermost first.
    pub fn stages(&self) -> Vec<&'static str> {
        let mut stages = Vec::with_capacity(4);
        if self.method.is_some() {
            stages.push("method");
        }
        if self.uri.is_some() {
            stages.push("uri");
        }
        if self.body.is_some() {
            stages.push("body_limit");
        }
        stages.push("signature");
        stages
    }

    /// Wraps `terminal` so that it only runs for admitted requests.
    ///
    /// Layers added later run earlier, so the innermost stage goes on first.
    pub fn wrap(&self, terminal: Router) -> Router {
        let mut router = terminal.layer(middleware::from_fn_with_state(
            self.signature.clone(),
            verify_signature,
        ));

        if let Some(limiter) = &self.body {
            router = router.layer(middleware::from_fn_with_state(limiter.clone(), limit_body));
        }
        if let Some(gate) = &self.uri {
            router = router.layer(middleware::from_fn_with_state(gate.clone(), restrict_uri));
        }
        if let Some(gate) = &self.method {
            router = router.layer(middleware::from_fn_with_state(gate.clone(), restrict_method));
        }

        router
    }
}
