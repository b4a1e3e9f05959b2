//! Route lookup.
//!
//! # Responsibilities
//! - Own the sorted rule table and the resolvers compiled from it
//! - Own the resolver cache
//! - Look up the resolver for a request or report an explicit miss
//!
//! # Design Decisions
//! - Built once at startup and shared via `Arc`; no globals
//! - The rule table is immutable after construction
//! - O(n) scan in specificity order on cache miss

use std::sync::Arc;

use crate::error::RuleError;
use crate::routing::matcher::{find_resolver, ResolverCache};
use crate::routing::parser::parse_rules;
use crate::routing::request::{parse_request_host_path, RequestData};
use crate::routing::resolver::{create_resolver, Resolver};
use crate::routing::rule::{RawRuleSet, Rule};
use crate::routing::sorter::sort_rules;

/// Default number of distinct host+path keys remembered.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// The routing table.
#[derive(Debug)]
pub struct Router {
    resolvers: Vec<Arc<Resolver>>,
    cache: ResolverCache,
}

impl Router {
    /// Parse, sort and compile a raw rule set.
    pub fn from_raw(raw: &RawRuleSet, cache_capacity: usize) -> Result<Self, RuleError> {
        let rules = parse_rules(raw)?;
        Ok(Self::from_rules(rules, cache_capacity))
    }

    /// Compile already parsed rules. They are sorted here.
    pub fn from_rules(rules: Vec<Rule>, cache_capacity: usize) -> Self {
        let resolvers: Vec<Arc<Resolver>> = sort_rules(rules)
            .into_iter()
            .map(|rule| Arc::new(create_resolver(rule)))
            .collect();

        tracing::info!(rules = resolvers.len(), "Routing table compiled");
        for (idx, resolver) in resolvers.iter().enumerate() {
            tracing::debug!(position = idx, rule = %resolver.rule().raw(), "Route");
        }

        Self {
            resolvers,
            cache: ResolverCache::new(cache_capacity),
        }
    }

    /// Resolvers in match order.
    pub fn resolvers(&self) -> &[Arc<Resolver>] {
        &self.resolvers
    }

    /// Rules in match order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.resolvers.iter().map(|r| r.rule())
    }

    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }

    /// Look up the resolver for parsed request data.
    pub fn find(&self, data: &RequestData) -> Option<Arc<Resolver>> {
        find_resolver(data, &self.resolvers, Some(&self.cache))
    }

    /// Parse a raw host header and path, then look up the resolver.
    pub fn match_request(&self, host: &str, path: &str) -> (RequestData, Option<Arc<Resolver>>) {
        let data = parse_request_host_path(host, path);
        let resolver = self.find(&data);
        (data, resolver)
    }
}
