//! Request matching logic.
//!
//! # Responsibilities
//! - Match request host labels against rule host labels (with `*`)
//! - Match request path against the rule's literal path prefix
//! - Scan resolvers in specificity order, memoizing host+path → resolver
//!
//! # Design Decisions
//! - Host matching walks labels TLD first; a rule `*` absorbs every
//!   remaining request label
//! - Path matching is a literal string prefix, case-sensitive
//! - The cache only ever holds exact request keys, never patterns
//! - Cached or not, the same resolver is selected

use std::sync::Arc;

use dashmap::DashMap;

use crate::routing::request::RequestData;
use crate::routing::resolver::Resolver;

/// True when `rule` host labels accept the `request` host labels.
///
/// Both sequences are TLD first. A `*` in the rule matches the request
/// label at that position and everything after it.
pub fn host_parts_match(rule: &[String], request: &[String]) -> bool {
    if rule.len() > request.len() {
        return false;
    }
    for (idx, label) in request.iter().enumerate() {
        match rule.get(idx) {
            Some(part) if part == "*" => return true,
            Some(part) if part == label => continue,
            _ => return false,
        }
    }
    true
}

/// True when the request path starts with the rule path.
pub fn path_matches(rule_path: &str, request_path: &str) -> bool {
    request_path.starts_with(rule_path)
}

/// Memo of exact `host$path` keys to the resolver they matched.
///
/// Entries are never evicted. Once `capacity` keys are stored, further
/// keys are resolved by scanning without being remembered.
#[derive(Debug)]
pub struct ResolverCache {
    entries: DashMap<String, Arc<Resolver>>,
    capacity: usize,
}

impl ResolverCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Resolver>> {
        self.entries.get(key).map(|r| Arc::clone(r.value()))
    }

    pub fn insert(&self, key: String, resolver: Arc<Resolver>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            tracing::trace!(key = %key, capacity = self.capacity, "Resolver cache full, not caching");
            return;
        }
        self.entries.insert(key, resolver);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the first resolver, in order, whose rule accepts the request.
///
/// Returns `None` when nothing matches.
pub fn find_resolver(
    data: &RequestData,
    resolvers: &[Arc<Resolver>],
    cache: Option<&ResolverCache>,
) -> Option<Arc<Resolver>> {
    let key = data.cache_key();
    if let Some(hit) = cache.and_then(|c| c.get(&key)) {
        return Some(hit);
    }

    let found = resolvers.iter().find(|resolver| {
        let base = resolver.rule().base();
        host_parts_match(&base.host_parts, &data.host_parts)
            && path_matches(&base.origin_path, &data.origin_path)
    })?;

    tracing::debug!(
        host = %data.origin_host,
        path = %data.origin_path,
        rule = %found.rule().raw(),
        "Resolver matched"
    );

    if let Some(cache) = cache {
        cache.insert(key, Arc::clone(found));
    }
    Some(Arc::clone(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::parser::parse_rule;
    use crate::routing::request::parse_request_host_path;
    use crate::routing::resolver::create_resolver;
    use crate::routing::sorter::sort_rules;

    fn parts(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn resolvers(pairs: &[(&str, &str)]) -> Vec<Arc<Resolver>> {
        let rules = pairs.iter().map(|(o, t)| parse_rule(o, t).unwrap()).collect();
        sort_rules(rules)
            .into_iter()
            .map(|r| Arc::new(create_resolver(r)))
            .collect()
    }

    fn matched(resolvers: &[Arc<Resolver>], host: &str, path: &str) -> Option<String> {
        let data = parse_request_host_path(host, path);
        find_resolver(&data, resolvers, None).map(|r| r.rule().base().origin_url.clone())
    }

    #[test]
    fn wildcard_host_matching() {
        assert!(host_parts_match(&parts(&["com", "test", "*"]), &parts(&["com", "test", "anything"])));
        assert!(host_parts_match(&parts(&["com", "test", "*"]), &parts(&["com", "test", "a", "b"])));
        assert!(!host_parts_match(&parts(&["com", "test"]), &parts(&["com", "test", "extra"])));
        assert!(!host_parts_match(&parts(&["com", "test", "*"]), &parts(&["com", "test"])));
        assert!(host_parts_match(&parts(&["*"]), &parts(&["net", "other"])));
        assert!(host_parts_match(&parts(&["com", "test"]), &parts(&["com", "test"])));
        assert!(!host_parts_match(&parts(&["com", "test"]), &parts(&["net", "test"])));
    }

    #[test]
    fn specificity_ordering() {
        let table = resolvers(&[
            ("*", "PROXY:fallback:1"),
            ("test.com", "PROXY:apex:1"),
            ("*.test.com", "PROXY:sub:1"),
        ]);
        assert_eq!(matched(&table, "test.com", "/").as_deref(), Some("test.com/"));
        assert_eq!(matched(&table, "sub.test.com", "/").as_deref(), Some("*.test.com/"));
        assert_eq!(matched(&table, "other.net", "/").as_deref(), Some("*/"));
    }

    #[test]
    fn path_prefix_matching() {
        let table = resolvers(&[("example.com/sub", "STATIC:/srv/sub")]);
        assert_eq!(
            matched(&table, "example.com", "/sub/page.html").as_deref(),
            Some("example.com/sub")
        );
        assert_eq!(matched(&table, "example.com", "/su"), None);
    }

    #[test]
    fn longer_path_wins() {
        let table = resolvers(&[
            ("example.com", "PROXY:root:1"),
            ("example.com/api", "PROXY:api:1"),
        ]);
        assert_eq!(matched(&table, "example.com", "/api/v1").as_deref(), Some("example.com/api"));
        assert_eq!(matched(&table, "example.com", "/home").as_deref(), Some("example.com/"));
    }

    #[test]
    fn no_match_is_none() {
        let table = resolvers(&[("example.com", "PROXY:root:1")]);
        assert_eq!(matched(&table, "example.org", "/"), None);
    }

    #[test]
    fn cache_is_keyed_by_exact_request() {
        let table = resolvers(&[("example.com", "PROXY:root:1")]);
        let cache = ResolverCache::new(16);

        let data = parse_request_host_path("example.com", "/a");
        let first = find_resolver(&data, &table, Some(&cache)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("example.com$/a").is_some());

        // A different rule table does not invalidate an existing entry.
        let other = resolvers(&[("example.com", "PROXY:elsewhere:1")]);
        let second = find_resolver(&data, &other, Some(&cache)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Without the cache the new table is used.
        let fresh = find_resolver(&data, &other, None).unwrap();
        assert!(Arc::ptr_eq(&fresh, &other[0]));
    }

    #[test]
    fn cache_respects_capacity() {
        let table = resolvers(&[("*", "PROXY:any:1")]);
        let cache = ResolverCache::new(2);
        for path in ["/1", "/2", "/3"] {
            let data = parse_request_host_path("h.com", path);
            assert!(find_resolver(&data, &table, Some(&cache)).is_some());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("h.com$/3").is_none());
    }
}
