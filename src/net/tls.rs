//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load PEM certificate, key and optional CA bundle
//! - Fall back to a self-signed certificate when none is usable
//! - Watch certificate files and hot-swap the served certificate
//!
//! # Design Decisions
//! - Reloads swap the rustls config in place; listeners, the routing table
//!   and connection counters are untouched
//! - A failed reload keeps the previous certificate

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::TlsConfig;
use crate::observability::metrics;

/// Delay used to coalesce bursts of file events into one reload.
const RELOAD_SETTLE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("self-signed certificate generation failed: {0}")]
    SelfSigned(#[from] rcgen::Error),
}

/// Certificate file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: Option<PathBuf>,
}

impl CertPaths {
    /// Paths configured in `[tls]`, if a certificate is configured at all.
    pub fn from_config(config: &TlsConfig) -> Option<Self> {
        Some(Self {
            cert: PathBuf::from(config.cert_path.as_ref()?),
            key: PathBuf::from(config.key_path.as_ref()?),
            ca: config.ca_path.as_ref().map(PathBuf::from),
        })
    }

    fn iter(&self) -> impl Iterator<Item = &Path> {
        [Some(self.cert.as_path()), Some(self.key.as_path()), self.ca.as_deref()]
            .into_iter()
            .flatten()
    }
}

/// PEM material for one certificate.
#[derive(Debug, Clone)]
pub struct CertBundle {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub ca: Option<Vec<u8>>,
}

impl CertBundle {
    /// Certificate followed by the CA bundle, as served to clients.
    pub fn chain_pem(&self) -> Vec<u8> {
        let mut chain = self.cert.clone();
        if let Some(ca) = &self.ca {
            if !chain.ends_with(b"\n") {
                chain.push(b'\n');
            }
            chain.extend_from_slice(ca);
        }
        chain
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and sanity-check certificate files.
pub fn load_certs(paths: &CertPaths) -> Result<CertBundle, TlsError> {
    let cert = read(&paths.cert)?;
    let key = read(&paths.key)?;
    let ca = paths.ca.as_deref().map(read).transpose()?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert.as_slice()))
        .filter_map(Result::ok)
        .count();
    if certs == 0 {
        return Err(TlsError::NoCertificates(paths.cert.clone()));
    }
    match rustls_pemfile::private_key(&mut BufReader::new(key.as_slice())) {
        Ok(Some(_)) => {}
        _ => return Err(TlsError::NoPrivateKey(paths.key.clone())),
    }

    Ok(CertBundle { cert, key, ca })
}

/// Generate a self-signed certificate for the given names.
pub fn self_signed(hosts: &[String]) -> Result<CertBundle, TlsError> {
    let rcgen::CertifiedKey { cert, signing_key } = rcgen::generate_simple_self_signed(hosts.to_vec())?;
    Ok(CertBundle {
        cert: cert.pem().into_bytes(),
        key: signing_key.serialize_pem().into_bytes(),
        ca: None,
    })
}

/// Build the rustls config for the HTTPS listener.
///
/// Returns the paths to watch when the certificate came from files.
pub async fn load_tls_config(config: &TlsConfig) -> Result<(RustlsConfig, Option<CertPaths>), TlsError> {
    let paths = CertPaths::from_config(config);

    let loaded = match &paths {
        Some(p) => match load_certs(p) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(error = %e, "Certificate unusable, falling back to self-signed");
                None
            }
        },
        None => None,
    };

    let (bundle, watch) = match loaded {
        Some(bundle) => (bundle, paths),
        None => {
            tracing::info!(hosts = ?config.self_signed_hosts, "Generating self-signed certificate");
            (self_signed(&config.self_signed_hosts)?, None)
        }
    };

    let rustls = RustlsConfig::from_pem(bundle.chain_pem(), bundle.key)
        .await
        .map_err(|source| TlsError::Io {
            path: watch.as_ref().map(|p| p.cert.clone()).unwrap_or_default(),
            source,
        })?;
    Ok((rustls, watch))
}

/// Swap the served certificate for the one currently on disk.
pub async fn reload_certificates(paths: &CertPaths, rustls: &RustlsConfig) -> Result<(), TlsError> {
    let bundle = load_certs(paths)?;
    rustls
        .reload_from_pem(bundle.chain_pem(), bundle.key)
        .await
        .map_err(|source| TlsError::Io {
            path: paths.cert.clone(),
            source,
        })
}

/// Watch certificate files and reload `rustls` when they change.
///
/// The returned watcher must be kept alive for watching to continue.
pub fn watch_certificates(paths: CertPaths, rustls: RustlsConfig) -> Result<RecommendedWatcher, notify::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watched: Vec<PathBuf> = paths.iter().map(Path::to_path_buf).collect();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = (event.kind.is_modify() || event.kind.is_create())
                    && event.paths.iter().any(|p| watched.iter().any(|w| p.ends_with(w) || w.ends_with(p)));
                if relevant {
                    let _ = tx.send(());
                }
            }
            Err(e) => tracing::error!("Certificate watch error: {:?}", e),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    // Watch directories so that replace-by-rename is seen too.
    for path in paths.iter() {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    tracing::info!(cert = ?paths.cert, "Certificate watcher started");

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            tokio::time::sleep(RELOAD_SETTLE).await;
            while rx.try_recv().is_ok() {}

            tracing::info!("Certificate change detected, reloading...");
            let result = reload_certificates(&paths, &rustls).await;
            metrics::record_cert_reload(result.is_ok());
            match result {
                Ok(()) => tracing::info!(cert = ?paths.cert, "Certificate reloaded"),
                Err(e) => tracing::error!("Failed to reload certificate: {}. Keeping current certificate.", e),
            }
        }
    });

    Ok(watcher)
}
