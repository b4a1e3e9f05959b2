//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Add X-Forwarded-* headers describing the inbound connection
//! - Strip hop-by-hop headers before forwarding
//!
//! # Design Decisions
//! - Forwarding headers are only added when the client did not send them,
//!   so chains of proxies keep the outermost values
//! - `Proxy-*` request headers reach only targets declared with `proxy://`
//! - Upgrade requests keep `Connection` and `Upgrade`

use std::net::SocketAddr;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PORT: &str = "x-forwarded-port";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_ORIGIN: &str = "x-forwarded-origin";
pub const X_FORWARDED_LOCAL_ADDRESS: &str = "x-forwarded-local-address";
pub const X_FORWARDED_LOCAL_PORT: &str = "x-forwarded-local-port";
pub const X_FORWARDED_SSL: &str = "x-forwarded-ssl";

const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const PROXY_REQUEST_HEADERS: [&str; 2] = ["proxy-authorization", "proxy-connection"];

/// Facts about the inbound connection used to build forwarding headers.
#[derive(Debug, Clone)]
pub struct ForwardContext<'a> {
    /// Client address.
    pub remote_addr: SocketAddr,
    /// Address of the listener that accepted the connection.
    pub local_addr: SocketAddr,
    /// Whether the inbound connection is TLS.
    pub secure: bool,
    /// Raw `Host` header value, port included when present.
    pub host: &'a str,
}

impl ForwardContext<'_> {
    fn proto(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Port the client addressed: explicit in `Host`, else the listener's.
    fn port(&self) -> u16 {
        let explicit = match self.host.rfind(':') {
            Some(idx) if !self.host[idx..].contains(']') => self.host[idx + 1..].parse().ok(),
            _ => None,
        };
        explicit.unwrap_or(self.local_addr.port())
    }
}

/// Add X-Forwarded-* headers that are not already present.
pub fn inject_forwarded_headers(headers: &mut HeaderMap, ctx: &ForwardContext<'_>) {
    let values = [
        (X_FORWARDED_FOR, ctx.remote_addr.ip().to_string()),
        (X_FORWARDED_PORT, ctx.port().to_string()),
        (X_FORWARDED_HOST, ctx.host.to_string()),
        (X_FORWARDED_PROTO, ctx.proto().to_string()),
        (X_FORWARDED_ORIGIN, format!("{}://{}", ctx.proto(), ctx.host)),
        (X_FORWARDED_LOCAL_ADDRESS, ctx.local_addr.ip().to_string()),
        (X_FORWARDED_LOCAL_PORT, ctx.local_addr.port().to_string()),
        (X_FORWARDED_SSL, if ctx.secure { "on" } else { "off" }.to_string()),
    ];

    for (name, value) in values {
        if headers.contains_key(name) {
            continue;
        }
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                headers.insert(HeaderName::from_static(name), v);
            }
            Err(_) => tracing::warn!(header = name, value = %value, "Skipping unrepresentable forwarding header"),
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool, allow_proxy_request_header: bool) {
    if !keep_upgrade {
        let named: Vec<String> = headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        for name in named {
            headers.remove(name.as_str());
        }
    }

    for name in HOP_BY_HOP {
        if keep_upgrade && (name == "connection" || name == "upgrade") {
            continue;
        }
        headers.remove(name);
    }

    if !allow_proxy_request_header {
        for name in PROXY_REQUEST_HEADERS {
            headers.remove(name);
        }
    }
}

/// True for `Connection: upgrade` + `Upgrade: websocket` requests.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let connection = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
    upgrade && connection
}
