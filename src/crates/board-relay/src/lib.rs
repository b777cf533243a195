//! board-relay library crate.
//!
//! This crate relays board control requests from editor clients to a hardware
//! driver and broadcasts component events back to every connected client.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Editors (JSON over WebSocket)
//!         ↕
//! [board-relay]
//!   ├── domain/           Pure types: wire messages, RelayConfig
//!   ├── application/      Board registry, component cache, event
//!   │                     subscriptions, request router, broadcaster
//!   └── infrastructure/
//!         ├── ws_server/  axum router, listener and WebSocket sessions
//!         └── http/       CORS preflight and POST echo on the same port
//!         ↕
//! board-driver (BoardDriver / Board / Component traits)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and the `board-driver` traits only; it
//!   never touches a socket.  Outbound messages leave through the
//!   [`application::ConnectionBroadcaster`] as serialized strings.
//! - `infrastructure` depends on all other layers plus `tokio`, `axum` and `tower-http`.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: session state and request handling.
pub mod application;

/// Infrastructure layer: listener, WebSocket sessions and plain HTTP.
pub mod infrastructure;
