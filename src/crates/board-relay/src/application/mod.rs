//! Application layer for board-relay.
//!
//! Use cases that sit between the wire (infrastructure) and the pure message
//! types (domain):
//!
//! - [`registry`]: one board connection per board id, shared by every request.
//! - [`components`]: one component per `(kind, args)` per board, plus
//!   idempotent event subscriptions.
//! - [`router`]: decodes a request, runs it, and broadcasts the outcome.
//! - [`broadcaster`]: the set of open connections every message goes to.
//! - [`context`]: the single owner of all of the above.
//!
//! Shared state is guarded by `std::sync::Mutex` and every lock is released
//! before the next `.await`.  The only suspension point inside a request chain
//! is waiting for a board to report ready.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod broadcaster;
pub mod components;
pub mod context;
pub mod error;
pub mod registry;
pub mod router;

pub use broadcaster::{ConnectionBroadcaster, ConnectionId};
pub use components::{ComponentCache, ComponentHandle, EventSubscription};
pub use context::RelayContext;
pub use error::RelayError;
pub use registry::{BoardRegistry, BoardSession, SessionStatus};
pub use router::RequestRouter;

/// Locks `mutex`, recovering the data if a previous holder panicked.
///
/// None of the guarded maps can be left half-updated by a panic, so the
/// poisoned state carries no information worth failing a request over.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
