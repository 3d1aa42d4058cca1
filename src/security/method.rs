//! HTTP method restriction.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::http::response::Rejection;

/// Admits only requests whose method is in the allow-list.
#[derive(Debug, Clone)]
pub struct MethodGate {
    allowed: Vec<String>,
}

impl MethodGate {
    /// Returns `None` for an empty allow-list: no list means no gate.
    pub fn new(allowed: &[String]) -> Option<Self> {
        if allowed.is_empty() {
            return None;
        }
        Some(Self {
            allowed: allowed.to_vec(),
        })
    }

    /// Exact match against the method as transmitted.
    pub fn admits(&self, method: &Method) -> bool {
        self.allowed.iter().any(|m| m == method.as_str())
    }
}

pub async fn restrict_method(
    State(gate): State<Arc<MethodGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.admits(request.method()) {
        return next.run(request).await;
    }

    tracing::debug!(method = %request.method(), "Method not allowed");
    Rejection::MethodNotAllowed.into_response()
}
