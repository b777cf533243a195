//! Infrastructure layer for board-relay.
//!
//! The infrastructure layer handles all I/O: the one TCP listener editors
//! connect to, the WebSocket sessions running on it, and the small plain-HTTP
//! surface served on the same port.
//!
//! # What does NOT belong here?
//!
//! - Request dispatch and board state (that is the application layer)
//! - Message type definitions (that is the domain layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod http;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use ws_server::{build_router, run_server, serve};
