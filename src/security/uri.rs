//! Request path restriction.
//!
//! # Responsibilities
//! - Match the request path against exact paths
//! - Match `/`-terminated patterns as "this path or anything below it"
//!
//! # Design Decisions
//! - Patterns without a leading `/` get one prepended
//! - Empty patterns are dropped: they must never widen admission
//! - Path matching is case-sensitive and ignores the query string
//! - No regex, O(n) scan over the configured patterns

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::http::response::Rejection;

/// One compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    /// Normalizes a configured pattern. Empty patterns yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }

        let normalized = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{}", raw)
        };

        if normalized.ends_with('/') {
            Some(PathPattern::Prefix(normalized))
        } else {
            Some(PathPattern::Exact(normalized))
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(expected) => path == expected,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Admits only requests whose path matches one of the configured patterns.
#[derive(Debug, Clone)]
pub struct UriGate {
    patterns: Vec<PathPattern>,
}

impl UriGate {
    /// Returns `None` for an empty list. A list made only of empty patterns
    /// still builds a gate, one that admits nothing.
    pub fn new(raw_patterns: &[String]) -> Option<Self> {
        if raw_patterns.is_empty() {
            return None;
        }

        let patterns: Vec<PathPattern> = raw_patterns
            .iter()
            .filter_map(|raw| PathPattern::parse(raw))
            .collect();

        if patterns.len() < raw_patterns.len() {
            tracing::warn!(
                dropped = raw_patterns.len() - patterns.len(),
                "Ignoring empty path patterns"
            );
        }

        Some(Self { patterns })
    }

    pub fn admits(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }
}

pub async fn restrict_uri(
    State(gate): State<Arc<UriGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.admits(request.uri().path()) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Path not allowed");
    Rejection::PathNotAllowed.into_response()
}
