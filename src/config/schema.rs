//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::routing::router::DEFAULT_CACHE_CAPACITY;
use crate::routing::RawRuleSet;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, ports).
    pub listener: ListenerConfig,

    /// Certificate sources for the HTTPS listener.
    pub tls: TlsConfig,

    /// Outbound proxy transport settings.
    pub proxy: ProxySettings,

    /// Routing table settings.
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Rule table: origin → `TYPE:value`.
    pub rules: RawRuleSet,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Plain HTTP port.
    pub http_port: u16,

    /// HTTPS port; HTTPS is disabled when unset.
    pub https_port: Option<u16>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 80,
            https_port: None,
        }
    }
}

/// TLS certificate configuration for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: Option<String>,

    /// Path to private key file (PEM).
    pub key_path: Option<String>,

    /// Optional CA bundle appended to the served chain (PEM).
    pub ca_path: Option<String>,

    /// Subject names for the self-signed fallback certificate.
    pub self_signed_hosts: Vec<String>,

    /// Reload certificates when the files change.
    pub watch: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            ca_path: None,
            self_signed_hosts: vec!["localhost".to_string()],
            watch: true,
        }
    }
}

/// Outbound connection settings for PROXY targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Time allowed to establish a backend connection, in milliseconds.
    pub reaction_timeout_ms: u64,

    /// Idle time allowed between reads from a backend, in milliseconds.
    pub connection_timeout_ms: u64,

    /// Verify backend TLS certificates.
    pub verify_certificates: bool,

    /// Follow redirects returned by backends instead of passing them on.
    pub follow_redirects: bool,
}

impl ProxySettings {
    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_millis(self.reaction_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            reaction_timeout_ms: 3_000,
            connection_timeout_ms: 60_000,
            verify_certificates: true,
            follow_redirects: false,
        }
    }
}

/// Routing table settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Maximum distinct host+path keys kept in the resolver cache.
    pub cache_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
