//! The single owner of all process-wide relay state.

use std::sync::Arc;
use std::time::Duration;

use board_driver::BoardDriver;

use crate::application::broadcaster::ConnectionBroadcaster;
use crate::application::registry::BoardRegistry;

/// Board sessions plus open connections, created once in `main` and handed to
/// every component that needs either.
pub struct RelayContext {
    registry: Arc<BoardRegistry>,
    broadcaster: ConnectionBroadcaster,
}

impl RelayContext {
    /// Creates an empty context whose boards are connected through `driver`.
    pub fn new(driver: Arc<dyn BoardDriver>, connect_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(BoardRegistry::new(driver, connect_timeout)),
            broadcaster: ConnectionBroadcaster::new(),
        })
    }

    pub fn registry(&self) -> &Arc<BoardRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &ConnectionBroadcaster {
        &self.broadcaster
    }
}
