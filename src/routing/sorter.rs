//! Rule ordering by specificity.
//!
//! First match wins, so the table is sorted most-specific first:
//! 1. more host labels
//! 2. literal host before wildcard host
//! 3. longer origin host
//! 4. longer origin path
//!
//! The sort is stable; rules with equal keys keep their definition order.

use std::cmp::Ordering;

use crate::routing::rule::Rule;

/// Order two rules by specificity, most specific first.
pub fn compare_rules(a: &Rule, b: &Rule) -> Ordering {
    let (a, b) = (a.base(), b.base());
    b.host_parts
        .len()
        .cmp(&a.host_parts.len())
        .then_with(|| a.has_wildcard.cmp(&b.has_wildcard))
        .then_with(|| b.origin_host.len().cmp(&a.origin_host.len()))
        .then_with(|| b.origin_path.len().cmp(&a.origin_path.len()))
}

/// Sort rules into match order.
pub fn sort_rules(mut rules: Vec<Rule>) -> Vec<Rule> {
    rules.sort_by(compare_rules);
    rules
}
