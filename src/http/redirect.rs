//! Plain HTTP listener that sends every client to HTTPS.
//!
//! Nothing is forwarded from here. The path and query are kept, the host
//! comes from the `Host` header and the port from the first TLS listener.

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Authority, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;

use crate::http::response::Rejection;

/// Where redirected clients are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpsRedirect {
    port: Option<u16>,
}

impl HttpsRedirect {
    /// The default HTTPS port is left out of generated locations.
    pub fn new(https_port: u16) -> Self {
        Self {
            port: (https_port != 443).then_some(https_port),
        }
    }

    /// Builds the `Location` for a request, `None` when it has no usable host.
    pub fn location(&self, request: &Request<Body>) -> Option<String> {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.parse::<Authority>().ok())
            .map(|authority| authority.host().to_string())
            .or_else(|| request.uri().host().map(str::to_string))?;

        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Some(match self.port {
            Some(port) => format!("https://{}:{}{}", host, port, path),
            None => format!("https://{}{}", host, path),
        })
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/{*path}", any(redirect_handler))
            .route("/", any(redirect_handler))
            .with_state(Arc::new(self))
    }
}

async fn redirect_handler(
    State(redirect): State<Arc<HttpsRedirect>>,
    request: Request<Body>,
) -> Response {
    let Some(location) = redirect.location(&request) else {
        tracing::warn!(uri = %request.uri(), "Redirect request without host");
        return Rejection::MissingHost.into_response();
    };

    let Ok(location_value) = HeaderValue::from_str(&location) else {
        return Rejection::MissingHost.into_response();
    };

    tracing::debug!(location = %location, "Redirecting to HTTPS");
    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, location_value),
            (header::CONNECTION, HeaderValue::from_static("close")),
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
        ],
        "Moved Permanently\n",
    )
        .into_response()
}
