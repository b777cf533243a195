//! Domain layer for board-relay.
//!
//! Pure types with no dependencies on I/O, networking or the async runtime:
//!
//! - Wire message types (the JSON "language" between editors and the relay)
//! - Configuration structures
//!
//! Anything that holds a socket, a channel or a driver handle lives in the
//! application or infrastructure layers instead.

pub mod config;
pub mod messages;

// Re-export the most commonly needed types at the domain module boundary
// so callers can write `domain::RelayConfig` instead of the longer path.
pub use config::{ConfigError, FileConfig, RelayConfig};
pub use messages::{ErrorDetail, Outbound, Request};
