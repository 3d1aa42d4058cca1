//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarder as the only handler
//! - Wrap it in the admission chain, the response deadline and request tracing
//! - Serve plain and TLS listeners with connection limits and graceful shutdown

use axum::{body::Body, http::Request, middleware, routing::any, Router};
use axum_server::{
    tls_rustls::{RustlsAcceptor, RustlsConfig},
    Handle, Server,
};
use hyper_util::rt::TokioTimer;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::http::chain::AdmissionChain;
use crate::http::deadline::{enforce_deadline, WriteDeadline};
use crate::http::forward::{proxy_handler, ForwardError, ProxyForwarder, UpstreamTarget};
use crate::net::idle::IdleAcceptor;
use crate::security::signature::{SignatureContext, SignatureVerifier};
use crate::security::AccessPolicy;

/// Time open connections get to finish after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Smallest request head limit the HTTP/1 parser accepts.
pub const MIN_HEADER_BYTES: usize = 8192;

/// Per-connection limits shared by every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Largest request head, in bytes. Larger heads are answered with 431.
    pub max_header_bytes: usize,
    /// Deadline for receiving a complete request head.
    pub header_read_timeout: Duration,
    /// Connections quiet for this long are closed.
    pub idle_timeout: Duration,
}

impl ConnectionLimits {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_header_bytes: config.policy.max_header_bytes.max(MIN_HEADER_BYTES),
            header_read_timeout: config.timeouts.body_read(),
            idle_timeout: config.timeouts.idle(),
        }
    }

    fn apply<A>(&self, server: &mut Server<A>) {
        let builder = server.http_builder();
        builder
            .http1()
            .timer(TokioTimer::new())
            .max_buf_size(self.max_header_bytes)
            .header_read_timeout(self.header_read_timeout);
        builder
            .http2()
            .max_header_list_size(u32::try_from(self.max_header_bytes).unwrap_or(u32::MAX));
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    limits: ConnectionLimits,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    /// Create a new gateway server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ForwardError> {
        let target = UpstreamTarget::parse(&config.upstream.target)?;
        let forwarder = ProxyForwarder::new(
            target,
            config.timeouts.connect(),
            config.timeouts.upstream(),
        );

        let verifier = SignatureVerifier::new(
            SignatureContext::new(
                config.signature.signing_secret.as_bytes(),
                config.signature.max_age(),
            ),
            config.timeouts.body_read(),
        );
        let chain = AdmissionChain::new(&AccessPolicy::from(&config.policy), verifier);

        tracing::info!(
            upstream = %config.upstream.target,
            stages = ?chain.stages(),
            "Admission chain assembled"
        );

        let deadline = WriteDeadline::new(config.timeouts.write());
        let router = Self::build_router(&chain, deadline, forwarder);
        Ok(Self {
            router,
            limits: ConnectionLimits::from_config(&config),
            config: Arc::new(config),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        chain: &AdmissionChain,
        deadline: WriteDeadline,
        forwarder: ProxyForwarder,
    ) -> Router {
        let terminal = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(Arc::new(forwarder));

        chain
            .wrap(terminal)
            .layer(middleware::from_fn_with_state(Arc::new(deadline), enforce_deadline))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %Uuid::new_v4(),
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
            )
    }

    /// The fully layered router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Limits applied to every accepted connection.
    pub fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting plain HTTP on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        serve(listener, self.router, self.limits, shutdown).await
    }
}

/// Handle that starts a bounded graceful shutdown once `shutdown` fires.
fn drain_on(mut shutdown: broadcast::Receiver<()>) -> Handle {
    let handle = Handle::new();
    let drain = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown.recv().await;
        drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });
    handle
}

/// Serve `router` on a plain listener until shutdown is signalled.
///
/// Open connections get [`DRAIN_TIMEOUT`] to finish.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    limits: ConnectionLimits,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    let mut server =
        axum_server::from_tcp(listener).acceptor(IdleAcceptor::new(limits.idle_timeout));
    limits.apply(&mut server);
    server
        .handle(drain_on(shutdown))
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!(address = %addr, "HTTP server stopped");
    Ok(())
}

/// Serve `router` behind TLS until shutdown is signalled.
///
/// Open connections get [`DRAIN_TIMEOUT`] to finish.
pub async fn serve_tls(
    listener: TcpListener,
    router: Router,
    limits: ConnectionLimits,
    tls: RustlsConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTPS server starting");

    let acceptor = RustlsAcceptor::new(tls).acceptor(IdleAcceptor::new(limits.idle_timeout));
    let mut server = axum_server::from_tcp(listener).acceptor(acceptor);
    limits.apply(&mut server);
    server
        .handle(drain_on(shutdown))
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!(address = %addr, "HTTPS server stopped");
    Ok(())
}
