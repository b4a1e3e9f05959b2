//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid and distinct)
//! - Check that certificate paths come in usable combinations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Rule text is validated by the rule parser, not here

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not an IP address", config.listener.bind_address),
        ));
    }
    if config.listener.http_port == 0 {
        errors.push(ValidationError::new("listener.http_port", "must be non-zero"));
    }
    match config.listener.https_port {
        Some(0) => errors.push(ValidationError::new("listener.https_port", "must be non-zero")),
        Some(port) if port == config.listener.http_port => errors.push(ValidationError::new(
            "listener.https_port",
            "must differ from listener.http_port",
        )),
        _ => {}
    }

    if config.tls.cert_path.is_some() != config.tls.key_path.is_some() {
        errors.push(ValidationError::new(
            "tls",
            "cert_path and key_path must be set together",
        ));
    }
    if config.tls.ca_path.is_some() && config.tls.cert_path.is_none() {
        errors.push(ValidationError::new("tls.ca_path", "requires cert_path"));
    }
    if config.tls.cert_path.is_none() && config.tls.self_signed_hosts.is_empty() {
        errors.push(ValidationError::new(
            "tls.self_signed_hosts",
            "needs at least one host when no certificate is configured",
        ));
    }

    if config.proxy.reaction_timeout_ms == 0 {
        errors.push(ValidationError::new("proxy.reaction_timeout_ms", "must be non-zero"));
    }
    if config.proxy.connection_timeout_ms == 0 {
        errors.push(ValidationError::new("proxy.connection_timeout_ms", "must be non-zero"));
    }

    if config.routing.cache_capacity == 0 {
        errors.push(ValidationError::new("routing.cache_capacity", "must be non-zero"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
