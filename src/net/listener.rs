//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind every configured address before any traffic is served
//! - Report the first failure with the address that caused it
//!
//! # Design Decisions
//! - All-or-nothing: a partially bound gateway never starts
//! - Port 0 is allowed; the bound address is logged and returned

use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Address is not a valid socket address.
    #[error("Invalid listen address {0:?}")]
    InvalidAddress(String),

    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Bound socket has no readable local address.
    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// Failed to hand a listener over to the server.
    #[error("Failed to prepare listener: {0}")]
    Convert(#[source] std::io::Error),
}

/// Bind a single address.
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| ListenerError::InvalidAddress(address.to_string()))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { address: addr, source })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { address: addr, source })?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

/// Bind every address in order, failing on the first error.
pub async fn bind_all(addresses: &[String]) -> Result<Vec<TcpListener>, ListenerError> {
    let mut listeners = Vec::with_capacity(addresses.len());
    for address in addresses {
        listeners.push(bind(address).await?);
    }
    Ok(listeners)
}

/// Local addresses of bound listeners, resolving any port 0.
pub fn local_addrs(listeners: &[TcpListener]) -> Result<Vec<SocketAddr>, ListenerError> {
    listeners
        .iter()
        .map(|l| l.local_addr().map_err(ListenerError::LocalAddr))
        .collect()
}

/// Convert a bound listener for axum-server, which serves std listeners.
pub fn into_std(listener: TcpListener) -> Result<std::net::TcpListener, ListenerError> {
    listener.into_std().map_err(ListenerError::Convert)
}
