//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind listeners and load certificates
//! - Start the certificate watcher
//! - Start serving in the background and report bound addresses
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners are bound before serving starts, so callers (and tests) can
//!   learn ephemeral ports

use std::net::SocketAddr;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{load_tls_config, watch_certificates, ListenerError, Listeners, TlsError};
use crate::routing::Router;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to build outbound client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to watch certificates: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A started proxy.
pub struct Running {
    pub http_addr: SocketAddr,
    pub https_addr: Option<SocketAddr>,
    task: JoinHandle<Result<(), std::io::Error>>,
    _watcher: Option<RecommendedWatcher>,
}

impl Running {
    /// Wait for the server to stop.
    pub async fn wait(self) -> Result<(), StartupError> {
        self.task.await??;
        Ok(())
    }
}

/// Bind, load certificates and start serving `router`.
pub async fn start(config: &ProxyConfig, router: Router, shutdown: &Shutdown) -> Result<Running, StartupError> {
    let Listeners { http, https } = Listeners::bind(&config.listener).await?;
    let http_addr = http.local_addr()?;

    let (https, https_addr, watcher) = match https {
        Some(listener) => {
            let addr = listener.local_addr()?;
            let (tls, watch) = load_tls_config(&config.tls).await?;
            let watcher = match watch {
                Some(paths) if config.tls.watch => Some(watch_certificates(paths, tls.clone())?),
                _ => None,
            };
            (Some((listener, tls)), Some(addr), watcher)
        }
        None => (None, None, None),
    };

    let server = HttpServer::new(router, &config.proxy)?;
    let task = tokio::spawn(server.run(http, https, shutdown));

    Ok(Running {
        http_addr,
        https_addr,
        task,
        _watcher: watcher,
    })
}
