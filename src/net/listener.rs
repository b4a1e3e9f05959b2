//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind the plain HTTP port and the optional HTTPS port
//! - Report the actual bound addresses (port 0 binds an ephemeral port)

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("`{0}` is not an IP address")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bound listening sockets, one per protocol.
#[derive(Debug)]
pub struct Listeners {
    pub http: TcpListener,
    pub https: Option<TcpListener>,
}

impl Listeners {
    /// Bind every port the configuration asks for.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let ip: IpAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

        let http = bind_one(SocketAddr::new(ip, config.http_port)).await?;
        let https = match config.https_port {
            Some(port) => Some(bind_one(SocketAddr::new(ip, port)).await?),
            None => None,
        };

        Ok(Self { http, https })
    }
}

async fn bind_one(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(address = %local_addr, "Listener bound");
    }
    Ok(listener)
}
