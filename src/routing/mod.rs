//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Rule compilation (at startup):
//!     RawRuleSet (origin → TYPE:value)
//!     → parser.rs (tokenize host/path, parse typed targets, validate)
//!     → sorter.rs (most specific first)
//!     → resolver.rs (compile into resolvers with balancing state)
//!     → router.rs (freeze as Router, shared via Arc)
//!
//! Incoming request (host, path):
//!     → request.rs (strip port, tokenize)
//!     → matcher.rs (cache lookup, then first matching resolver)
//!     → resolver.rs (pick target, substitute variables, rewrite path)
//!     → Return: Action or NoMatch
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - No regex in hot path (label and prefix comparison only)
//! - Deterministic: same input always matches same rule
//! - First match wins (ordered by specificity)

pub mod matcher;
pub mod parser;
pub mod request;
pub mod resolver;
pub mod router;
pub mod rule;
pub mod sorter;

pub use matcher::{find_resolver, host_parts_match, ResolverCache};
pub use parser::{parse_rule, parse_rules};
pub use request::{parse_request_host_path, RequestData};
pub use resolver::{create_resolver, Action, ProxyDispatch, Resolver, INDEX_FILES};
pub use router::Router;
pub use rule::{RawRuleSet, Rule, TargetType};
pub use sorter::sort_rules;
