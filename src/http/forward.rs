//! Forwarding admitted requests to the single upstream.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the configured upstream origin
//! - Send method, headers and body unchanged (minus hop-by-hop headers)
//! - Stream the upstream response back to the caller
//!
//! # Design Decisions
//! - One fixed upstream, no retries, no load balancing
//! - Pooled HTTP/1.1 client shared by every request
//! - Connection failures become 502, exceeding the upstream deadline becomes 504

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Uri, Version},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::http::response::Rejection;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

/// Error type for upstream target parsing.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("upstream url must use http, got {0}")]
    UnsupportedScheme(String),

    #[error("upstream url has no host")]
    MissingHost,

    #[error("cannot build upstream uri: {0}")]
    InvalidUri(#[from] axum::http::Error),
}

/// Parsed upstream origin plus optional base path and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    authority: String,
    base_path: String,
    base_query: Option<String>,
}

impl UpstreamTarget {
    pub fn parse(raw: &str) -> Result<Self, ForwardError> {
        let url = Url::parse(raw)?;
        if url.scheme() != "http" {
            return Err(ForwardError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(ForwardError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            authority,
            base_path: url.path().to_string(),
            base_query: url.query().map(str::to_string),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Maps an inbound URI onto the upstream.
    pub fn rewrite(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        let path = join_paths(&self.base_path, inbound.path());
        let query = [self.base_query.as_deref(), inbound.query()]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .collect::<Vec<_>>()
            .join("&");

        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query)
        };

        Ok(Uri::builder()
            .scheme("http")
            .authority(self.authority.as_str())
            .path_and_query(path_and_query)
            .build()?)
    }
}

/// Joins two paths with exactly one `/` between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// How long a pooled upstream connection may sit unused.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Reverse proxy to a single upstream host.
#[derive(Clone)]
pub struct ProxyForwarder {
    client: Client<HttpConnector, Body>,
    target: UpstreamTarget,
    timeout: Duration,
}

impl ProxyForwarder {
    pub fn new(
        target: UpstreamTarget,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(connector);

        Self {
            client,
            target,
            timeout,
        }
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Forwards one admitted request and relays the upstream response.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let (mut parts, body) = request.into_parts();

        parts.uri = match self.target.rewrite(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build upstream uri");
                return Rejection::UpstreamUnavailable.into_response();
            }
        };
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut parts.headers, ip);
        }

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        tracing::debug!(method = %method, uri = %uri, "Forwarding request upstream");

        let outbound = Request::from_parts(parts, body);
        match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                tracing::debug!(status = %parts.status, "Upstream responded");
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::error!(uri = %uri, error = %e, "Upstream request failed");
                Rejection::UpstreamUnavailable.into_response()
            }
            Err(_) => {
                tracing::error!(uri = %uri, timeout = ?self.timeout, "Upstream request timed out");
                Rejection::UpstreamTimeout.into_response()
            }
        }
    }
}

/// Terminal handler of the admission chain.
pub async fn proxy_handler(
    State(forwarder): State<Arc<ProxyForwarder>>,
    request: Request<Body>,
) -> Response {
    forwarder.forward(request).await
}
