//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the admission chain and forwarder from the validated config
//! - Load TLS material
//! - Bind every listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Nothing serves until every listener is bound
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use tokio::task::JoinSet;

use crate::config::GatewayConfig;
use crate::http::forward::ForwardError;
use crate::http::redirect::HttpsRedirect;
use crate::http::server::{serve, serve_tls, GatewayServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::{bind_all, into_std, local_addrs, ListenerError};
use crate::net::tls::load_tls_config;

/// Error type for startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] ForwardError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("TLS error: {0}")]
    Tls(#[source] std::io::Error),

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Handle on the running servers.
pub struct RunningGateway {
    addresses: Vec<SocketAddr>,
    redirect_addresses: Vec<SocketAddr>,
    tasks: JoinSet<Result<(), std::io::Error>>,
}

impl RunningGateway {
    /// Bound addresses of the gateway listeners, in configuration order.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Bound addresses of the HTTPS redirect listeners.
    pub fn redirect_addresses(&self) -> &[SocketAddr] {
        &self.redirect_addresses
    }

    /// Waits for every server to stop, returning the first failure.
    pub async fn wait(mut self) -> Result<(), StartupError> {
        while let Some(joined) = self.tasks.join_next().await {
            joined?.map_err(StartupError::Serve)?;
        }
        tracing::info!("All listeners stopped");
        Ok(())
    }
}

/// Start serving `config` until `shutdown` is triggered.
pub async fn start(config: GatewayConfig, shutdown: &Shutdown) -> Result<RunningGateway, StartupError> {
    let server = GatewayServer::new(config)?;
    let config = server.config().clone();
    let router = server.router();
    let limits = server.limits();

    let tls = match &config.listener.tls {
        Some(tls) => Some(
            load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                .await
                .map_err(StartupError::Tls)?,
        ),
        None => None,
    };

    let listeners = bind_all(&config.listener.addresses).await?;
    let redirect_listeners = match &config.listener.tls {
        Some(tls) => bind_all(&tls.redirect_addresses).await?,
        None => Vec::new(),
    };

    let addresses = local_addrs(&listeners)?;
    let redirect_addresses = local_addrs(&redirect_listeners)?;

    let mut tasks = JoinSet::new();
    match tls {
        Some(tls) => {
            for listener in listeners {
                let listener = into_std(listener)?;
                tasks.spawn(serve_tls(
                    listener,
                    router.clone(),
                    limits,
                    tls.clone(),
                    shutdown.subscribe(),
                ));
            }

            if let Some(https_port) = addresses.first().map(SocketAddr::port) {
                let redirect = HttpsRedirect::new(https_port).router();
                for listener in redirect_listeners {
                    let listener = into_std(listener)?;
                    tasks.spawn(serve(listener, redirect.clone(), limits, shutdown.subscribe()));
                }
            }
        }
        None => {
            for listener in listeners {
                let listener = into_std(listener)?;
                tasks.spawn(serve(listener, router.clone(), limits, shutdown.subscribe()));
            }
        }
    }

    tracing::info!(
        listeners = ?addresses,
        redirects = ?redirect_addresses,
        tls = config.listener.tls.is_some(),
        "Gateway ready"
    );

    Ok(RunningGateway {
        addresses,
        redirect_addresses,
        tasks,
    })
}
