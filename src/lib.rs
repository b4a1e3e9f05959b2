//! Host/path rule-based reverse proxy and static file server.
//!
//! Rules of the form `origin=TYPE:value` map request hosts and paths to
//! backends (PROXY), directories (STATIC) or other locations (REDIRECT).

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{DispatchError, RuleError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::Router;
