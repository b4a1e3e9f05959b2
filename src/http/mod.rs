//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, panic boundary)
//!     → request.rs (host extraction, request ID)
//!     → routing::Router (match against the sorted rule table)
//!     → dispatch.rs (proxy / websocket tunnel / redirect)
//!     → static_files.rs (STATIC rules)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod server;
pub mod static_files;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{build_client, AppState, HttpServer, ListenerInfo};
