//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Matched PROXY request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Forward to backend
//! ```
//!
//! # Design Decisions
//! - No trust in client input: hop-by-hop headers never cross the proxy
//! - Client-supplied forwarding headers are kept, not overwritten

pub mod headers;
