//! Rule proxy
//!
//! A host/path rule-based reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     RULE PROXY                       │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!   ──────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │      │
//!                     │  │listeners│    │ server  │    │ match+cache  │      │
//!                     │  └─────────┘    └─────────┘    └──────┬───────┘      │
//!                     │                                       │              │
//!                     │                                       ▼              │
//!                     │                               ┌──────────────┐       │
//!                     │                               │   resolver   │       │
//!                     │                               │ + balancing  │       │
//!                     │                               └──────┬───────┘       │
//!                     │                   ┌──────────────────┼─────────┐     │
//!                     │                   ▼                  ▼         ▼     │
//!   Client Response   │             ┌──────────┐      ┌──────────┐ ┌───────┐ │
//!   ◀─────────────────┼─────────────│  static  │      │  proxy   │ │ 301   │ │──▶ Backend
//!                     │             │  files   │      │ http/ws  │ │       │ │
//!                     │             └──────────┘      └──────────┘ └───────┘ │
//!                     │                                                      │
//!                     │  Cross-cutting: config, tls reload, observability,   │
//!                     │  lifecycle                                           │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use rule_proxy::config::loader::{collect_arg_rules, collect_env_rules};
use rule_proxy::config::validation::validate_config;
use rule_proxy::config::{load_config, ConfigError, ProxyConfig};
use rule_proxy::lifecycle::{self, signals, Shutdown};
use rule_proxy::observability::{logging, metrics};
use rule_proxy::routing::Router;

#[derive(Parser, Debug)]
#[command(name = "rule-proxy", version)]
#[command(about = "Host/path rule-based reverse proxy and static file server", long_about = None)]
struct Cli {
    /// Rules as origin=TYPE:value, e.g. example.com=PROXY:localhost:3000
    rules: Vec<String>,

    /// TOML configuration file
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind listeners on
    #[arg(long, env = "BIND_ADDRESS")]
    bind: Option<String>,

    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Enables the HTTPS listener
    #[arg(long, env = "HTTPS_PORT")]
    https_port: Option<u16>,

    /// Certificate file (PEM)
    #[arg(long, env = "CERT_PATH")]
    cert: Option<String>,

    /// Private key file (PEM)
    #[arg(long, env = "KEY_PATH")]
    key: Option<String>,

    /// CA bundle appended to the certificate chain (PEM)
    #[arg(long, env = "CA_PATH")]
    ca: Option<String>,

    /// Backend connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    reaction_timeout: Option<u64>,

    /// Backend idle timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connection_timeout: Option<u64>,

    /// Do not verify backend certificates
    #[arg(long)]
    insecure: bool,

    /// Follow redirects returned by backends
    #[arg(long)]
    follow_redirects: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    metrics: Option<String>,

    /// Print the parsed, sorted rule table as JSON and exit
    #[arg(long)]
    print_rules: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Overlay command-line settings on the loaded configuration.
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(port) = self.http_port {
            config.listener.http_port = port;
        }
        if self.https_port.is_some() {
            config.listener.https_port = self.https_port;
        }
        if self.cert.is_some() {
            config.tls.cert_path = self.cert.clone();
        }
        if self.key.is_some() {
            config.tls.key_path = self.key.clone();
        }
        if self.ca.is_some() {
            config.tls.ca_path = self.ca.clone();
        }
        if let Some(ms) = self.reaction_timeout {
            config.proxy.reaction_timeout_ms = ms;
        }
        if let Some(ms) = self.connection_timeout {
            config.proxy.connection_timeout_ms = ms;
        }
        if self.insecure {
            config.proxy.verify_certificates = false;
        }
        if self.follow_redirects {
            config.proxy.follow_redirects = true;
        }
        if let Some(addr) = &self.metrics {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr.clone();
        }
    }

    fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    // File rules, then RULE_n, then positional arguments; later origins win.
    config.rules.extend(collect_env_rules(|key| std::env::var(key).ok())?);
    config.rules.extend(collect_arg_rules(&cli.rules)?);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(cli.log_level(&config.observability.log_level));
    tracing::info!("rule-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let router = match Router::from_raw(&config.rules, config.routing.cache_capacity) {
        Ok(router) => router,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load rules");
            return Err(e.into());
        }
    };

    if cli.print_rules {
        let rules: Vec<_> = router.rules().collect();
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let running = lifecycle::start(&config, router, &shutdown).await?;
    tracing::info!(
        http = %running.http_addr,
        https = ?running.https_addr,
        "Listening for connections"
    );
    signals::spawn_signal_handler(shutdown);

    running.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
