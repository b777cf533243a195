//! Fan-out of outbound messages to every open connection.
//!
//! The protocol has no per-connection addressing: responses and events alike
//! go to every connected editor.  [`ConnectionBroadcaster`] keeps one
//! unbounded channel sender per live connection; the infrastructure layer owns
//! the matching receiver and writes whatever arrives on it to the socket.
//!
//! # Failure isolation
//!
//! A send only fails when the connection's writer task has already gone away.
//! Such a connection is dropped from the set and delivery continues to the
//! others, so one dead socket never costs the rest a message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::lock;
use crate::domain::messages::Outbound;

/// Identifier of one client connection.
pub type ConnectionId = Uuid;

/// Set of open connections.  Cloning shares the same set.
#[derive(Clone, Default)]
pub struct ConnectionBroadcaster {
    connections: Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>>,
}

impl ConnectionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns its id plus the receiver its writer task
    /// drains.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut connections = lock(&self.connections);
        connections.insert(id, tx);
        info!("connection {id} registered. Total: {}", connections.len());
        (id, rx)
    }

    /// Removes a connection.  Safe to call more than once; returns `true` only
    /// the first time.
    ///
    /// Dropping the sender ends the connection's writer task.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = lock(&self.connections);
        let removed = connections.remove(&id).is_some();
        if removed {
            info!("connection {id} unregistered. Remaining: {}", connections.len());
        }
        removed
    }

    /// Serializes `message` once and queues it on every open connection.
    ///
    /// Returns the number of connections the message was queued on.
    pub fn broadcast(&self, message: &Outbound) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize outbound message: {e}");
                return 0;
            }
        };

        let mut connections = lock(&self.connections);
        let mut dead = Vec::new();
        for (id, tx) in connections.iter() {
            if tx.send(text.clone()).is_err() {
                warn!("connection {id}: writer gone; dropping connection");
                dead.push(*id);
            }
        }
        for id in &dead {
            connections.remove(id);
        }

        let delivered = connections.len();
        debug!("broadcast to {delivered} connection(s): {text}");
        delivered
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
