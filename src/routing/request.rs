//! Incoming request normalization.
//!
//! # Responsibilities
//! - Strip the port from the `Host` header (IPv4, hostname, bracketed IPv6)
//! - Tokenize the host into labels, TLD first, the same way rules are tokenized
//! - Tokenize the path into non-empty segments
//!
//! # Design Decisions
//! - IPv4 literals are a single host part, never split on `.`
//! - Hosts are lower-cased; paths are kept verbatim

/// Host and path of an incoming request, tokenized for matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestData {
    /// Host without port, e.g. `www.example.com`.
    pub origin_host: String,
    /// Request path, always starting with `/`.
    pub origin_path: String,
    /// `origin_host + origin_path`, for diagnostics.
    pub origin_url: String,
    /// Host labels, TLD first.
    pub host_parts: Vec<String>,
    pub path_parts: Vec<String>,
}

impl RequestData {
    /// Exact cache key for this request.
    pub fn cache_key(&self) -> String {
        format!("{}${}", self.origin_host, self.origin_path)
    }
}

/// Parse a raw `Host` header value and URL path.
pub fn parse_request_host_path(host: &str, path: &str) -> RequestData {
    let origin_host = strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase();
    let host_parts = split_host(&origin_host);

    let origin_path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let path_parts = split_path(&origin_path);

    RequestData {
        origin_url: format!("{}{}", origin_host, origin_path),
        origin_host,
        origin_path,
        host_parts,
        path_parts,
    }
}

/// Remove a trailing `:port` from a host header value.
pub(crate) fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [::1]:8080 or [::1]
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => rest,
        };
    }
    match host.rfind(':') {
        Some(idx) => &host[..idx],
        None => host,
    }
}

/// Split a host into labels, TLD first. IPv4 literals stay whole.
pub(crate) fn split_host(host: &str) -> Vec<String> {
    if host.is_empty() {
        return Vec::new();
    }
    if is_ipv4(host) || host.contains(':') {
        return vec![host.to_string()];
    }
    host.split('.').rev().map(str::to_string).collect()
}

/// Split a path into segments, dropping leading and trailing empties.
pub(crate) fn split_path(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').collect();
    let start = parts.iter().position(|p| !p.is_empty());
    let end = parts.iter().rposition(|p| !p.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => parts[start..=end].iter().map(|p| p.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Strict dotted-quad check: four decimal octets, each 0-255.
pub(crate) fn is_ipv4(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty()
                && o.len() <= 3
                && o.bytes().all(|b| b.is_ascii_digit())
                && o.parse::<u16>().map(|v| v <= 255).unwrap_or(false)
        })
}
