//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → listener.rs (bind HTTP and optional HTTPS sockets)
//!     → tls.rs (certificate load, self-signed fallback, hot reload)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - HTTPS is optional and shares the routing table with HTTP
//! - Certificate reloads never touch bound sockets

pub mod listener;
pub mod tls;

pub use listener::{ListenerError, Listeners};
pub use tls::{load_certs, load_tls_config, self_signed, watch_certificates, CertBundle, CertPaths, TlsError};
