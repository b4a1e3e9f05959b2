//! Resolver factory.
//!
//! # Responsibilities
//! - Compile each rule into a runtime resolver, once, after sorting
//! - Own the per-rule balancing state (least connections for PROXY,
//!   round robin for REDIRECT)
//! - Turn a matched request into a concrete action: which directory, which
//!   backend, which location. The HTTP layer performs the I/O.
//!
//! # Design Decisions
//! - Balancing state exists only for rules with more than one target
//! - A proxy pick returns a guard; the connection is counted until it drops
//! - Errors propagate to the request boundary, nothing is swallowed here

use std::path::PathBuf;

use crate::error::DispatchError;
use crate::load_balancer::{LeastConnections, RoundRobin, TargetGuard};
use crate::routing::request::RequestData;
use crate::routing::rule::{ProxyRule, RedirectRule, Rule, StaticRule, TargetType};

/// Files tried, in order, when a static request names a directory.
pub const INDEX_FILES: [&str; 6] = [
    "index.html",
    "index.htm",
    "index.php",
    "index.md",
    "index.txt",
    "index.json",
];

#[derive(Debug)]
enum Balancer {
    Single,
    LeastConnections(LeastConnections),
    RoundRobin(RoundRobin),
}

/// Runtime form of a rule.
#[derive(Debug)]
pub struct Resolver {
    rule: Rule,
    balancer: Balancer,
}

/// Compile a rule into a resolver.
pub fn create_resolver(rule: Rule) -> Resolver {
    let balancer = match &rule {
        Rule::Proxy(r) if r.target.len() > 1 => {
            Balancer::LeastConnections(LeastConnections::new(r.target.len()))
        }
        Rule::Redirect(r) if r.target.len() > 1 => Balancer::RoundRobin(RoundRobin::new()),
        _ => Balancer::Single,
    };
    Resolver { rule, balancer }
}

/// What to do with a matched request.
#[derive(Debug)]
pub enum Action {
    /// Serve `path` from the directory `root`.
    Static { root: PathBuf, path: String },
    /// Forward to a backend.
    Proxy(ProxyDispatch),
    /// Answer 301 with this `Location`.
    Redirect { location: String },
}

/// A selected, fully substituted proxy backend.
#[derive(Debug)]
pub struct ProxyDispatch {
    /// Position of the target in the rule's target list.
    pub target_id: usize,
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Request path with the rule's prefix removed.
    pub path: String,
    pub allow_proxy_request_header: bool,
    /// Held for as long as the proxied connection lives.
    pub guard: Option<TargetGuard>,
}

impl ProxyDispatch {
    /// `host:port` of the backend.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Outbound URL including the original query string.
    pub fn url(&self, query: Option<&str>) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        match query {
            Some(q) if !q.is_empty() => format!("{}://{}{}?{}", scheme, self.authority(), self.path, q),
            _ => format!("{}://{}{}", scheme, self.authority(), self.path),
        }
    }
}

impl Resolver {
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn target_type(&self) -> TargetType {
        self.rule.target_type()
    }

    /// Live connections on a proxy target; zero for unbalanced resolvers.
    pub fn connections(&self, target_id: usize) -> usize {
        match &self.balancer {
            Balancer::LeastConnections(lb) => lb.count(target_id),
            _ => 0,
        }
    }

    /// Decide how to serve a request this resolver matched.
    pub fn resolve(&self, data: &RequestData) -> Result<Action, DispatchError> {
        match &self.rule {
            Rule::Static(rule) => self.resolve_static(rule, data),
            Rule::Proxy(rule) => self.resolve_proxy(rule, data).map(Action::Proxy),
            Rule::Redirect(rule) => self.resolve_redirect(rule, data),
        }
    }

    fn resolve_static(&self, rule: &StaticRule, data: &RequestData) -> Result<Action, DispatchError> {
        Ok(Action::Static {
            root: PathBuf::from(rule.target.render(data)?),
            path: strip_origin_path(&rule.base.origin_path, &data.origin_path),
        })
    }

    fn resolve_proxy(&self, rule: &ProxyRule, data: &RequestData) -> Result<ProxyDispatch, DispatchError> {
        let (target_id, guard) = match &self.balancer {
            Balancer::LeastConnections(lb) => match lb.pick() {
                Some(guard) => (guard.id(), Some(guard)),
                None => (0, None),
            },
            _ => (0, None),
        };
        let target = &rule.target[target_id];

        Ok(ProxyDispatch {
            target_id,
            secure: target.secure,
            host: target.host.render(data)?,
            port: target.port,
            path: strip_origin_path(&rule.base.origin_path, &data.origin_path),
            allow_proxy_request_header: target.allow_proxy_request_header,
            guard,
        })
    }

    fn resolve_redirect(&self, rule: &RedirectRule, data: &RequestData) -> Result<Action, DispatchError> {
        let idx = match &self.balancer {
            Balancer::RoundRobin(rr) => rr.next_index(rule.target.len()).unwrap_or(0),
            _ => 0,
        };
        let target = &rule.target[idx];
        let location = format!(
            "{}://{}:{}{}",
            target.protocol,
            target.host.render(data)?,
            target.port,
            target.path.render(data)?
        );
        Ok(Action::Redirect { location })
    }
}

/// Remove the rule's path prefix from the request path, keeping a leading `/`.
pub fn strip_origin_path(rule_path: &str, request_path: &str) -> String {
    let rest = request_path.strip_prefix(rule_path).unwrap_or(request_path);
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    }
}
