//! Load balancing across the targets of a single rule.
//!
//! # Data Flow
//! ```text
//! PROXY rule matched
//!     → least_conn.rs (pick target with fewest live connections)
//!     → TargetGuard held for the proxied connection's lifetime
//!     → guard dropped on close/error → count released
//!
//! REDIRECT rule matched
//!     → round_robin.rs (next index in arrival order)
//! ```
//!
//! # Design Decisions
//! - State is owned by each resolver, not shared between rules
//! - Counters are atomics so the router can be shared across worker threads
//! - Release is tied to `Drop`, so every pick is released exactly once

pub mod least_conn;
pub mod round_robin;

pub use least_conn::{LeastConnections, TargetGuard};
pub use round_robin::RoundRobin;
