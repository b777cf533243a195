//! Process-wide map from board id to its (single) board connection.
//!
//! # Lifecycle of an entry
//!
//! ```text
//!  acquire("A") ── no entry ──► insert Connecting ──► spawn connect task
//!                                   │
//!          driver Ready ────────────┼──► Ready(session)   (waiters resolve)
//!          driver Error / timeout ──┼──► evict, Failed    (waiters fail)
//!                                   │
//!          driver Exit (after Ready) ──► evict            (next acquire reconnects)
//! ```
//!
//! Each entry is the receiving end of a `tokio::sync::watch` channel whose
//! sender belongs to the task driving the connection.  Every concurrent
//! `acquire` for the same id clones the same receiver and waits on it, so one
//! connection attempt serves all of them.
//!
//! The entry is inserted while the map lock is held and before anything is
//! awaited, which closes the window in which two back-to-back requests for a
//! new id could both start a connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use board_driver::{Board, BoardDriver, BoardLink, BoardOptions, BoardSignal};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::components::ComponentCache;
use crate::application::error::RelayError;
use crate::application::lock;

/// A ready board and the components constructed on it.
pub struct BoardSession {
    id: String,
    components: ComponentCache,
}

impl BoardSession {
    fn new(id: String, board: Arc<dyn Board>) -> Self {
        Self {
            components: ComponentCache::new(id.clone(), board),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn components(&self) -> &ComponentCache {
        &self.components
    }
}

/// Observable state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Ready,
    Failed,
}

#[derive(Clone)]
enum SessionState {
    Connecting,
    Ready(Arc<BoardSession>),
    Failed(RelayError),
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        match self {
            SessionState::Connecting => SessionStatus::Connecting,
            SessionState::Ready(_) => SessionStatus::Ready,
            SessionState::Failed(_) => SessionStatus::Failed,
        }
    }
}

/// At most one connection attempt and one session per board id.
pub struct BoardRegistry {
    driver: Arc<dyn BoardDriver>,
    connect_timeout: Duration,
    boards: Mutex<HashMap<String, watch::Receiver<SessionState>>>,
}

impl BoardRegistry {
    /// Creates an empty registry that connects boards through `driver`,
    /// giving each one `connect_timeout` to report ready.
    pub fn new(driver: Arc<dyn BoardDriver>, connect_timeout: Duration) -> Self {
        Self {
            driver,
            connect_timeout,
            boards: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the ready session for `board_id`, connecting it first if no
    /// connection exists or is in progress.
    ///
    /// # Errors
    ///
    /// [`RelayError::BoardUnavailable`] if the connection attempt this call
    /// waited on failed, timed out or was abandoned.  The failed entry has
    /// already been removed, so the next call starts a fresh attempt.
    pub async fn acquire(self: &Arc<Self>, board_id: &str) -> Result<Arc<BoardSession>, RelayError> {
        let mut entry = {
            let mut boards = lock(&self.boards);
            match boards.get(board_id) {
                Some(entry) => entry.clone(),
                None => {
                    let (tx, entry) = watch::channel(SessionState::Connecting);
                    boards.insert(board_id.to_string(), entry.clone());
                    info!("board {board_id}: connecting");
                    tokio::spawn(Arc::clone(self).drive(board_id.to_string(), tx, entry.clone()));
                    entry
                }
            }
        };

        // Bound to a local so the watch borrow ends before `entry` is dropped.
        let result = match entry
            .wait_for(|state| !matches!(state, SessionState::Connecting))
            .await
        {
            Ok(state) => match &*state {
                SessionState::Ready(session) => Ok(Arc::clone(session)),
                SessionState::Failed(err) => Err(err.clone()),
                SessionState::Connecting => Err(abandoned(board_id)),
            },
            Err(_) => Err(abandoned(board_id)),
        };
        result
    }

    /// State of the entry for `board_id`, or `None` if there is none.
    pub fn status(&self, board_id: &str) -> Option<SessionStatus> {
        lock(&self.boards)
            .get(board_id)
            .map(|entry| entry.borrow().status())
    }

    pub fn contains(&self, board_id: &str) -> bool {
        lock(&self.boards).contains_key(board_id)
    }

    /// Number of boards connected or connecting.
    pub fn len(&self) -> usize {
        lock(&self.boards).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connects `board_id` and then watches it until it goes away.
    ///
    /// `entry` is this attempt's own receiver; it identifies the registry
    /// entry this task is allowed to evict.
    async fn drive(
        self: Arc<Self>,
        board_id: String,
        tx: watch::Sender<SessionState>,
        entry: watch::Receiver<SessionState>,
    ) {
        // One deadline covers both the driver's connect call and the wait for Ready.
        let deadline = time::Instant::now() + self.connect_timeout;
        let options = BoardOptions::new(board_id.clone(), self.connect_timeout);
        let BoardLink { board, mut signals } =
            match time::timeout_at(deadline, self.driver.connect(options)).await {
                Ok(Ok(link)) => link,
                Ok(Err(e)) => {
                    self.fail(&board_id, &entry, &tx, e.to_string());
                    return;
                }
                Err(_) => {
                    self.fail(&board_id, &entry, &tx, self.not_ready(&board_id));
                    return;
                }
            };

        match time::timeout_at(deadline, signals.recv()).await {
            Ok(Some(BoardSignal::Ready)) => {}
            Ok(Some(BoardSignal::Error(reason))) => {
                self.fail(&board_id, &entry, &tx, reason);
                return;
            }
            Ok(Some(BoardSignal::Exit)) | Ok(None) => {
                let reason = format!("board {board_id} exited before it was ready");
                self.fail(&board_id, &entry, &tx, reason);
                return;
            }
            Err(_) => {
                self.fail(&board_id, &entry, &tx, self.not_ready(&board_id));
                return;
            }
        }

        let session = Arc::new(BoardSession::new(board_id.clone(), board));
        tx.send_replace(SessionState::Ready(session));
        info!("board {board_id}: connected");

        loop {
            match signals.recv().await {
                Some(BoardSignal::Ready) => debug!("board {board_id}: repeated ready signal ignored"),
                Some(BoardSignal::Error(reason)) => {
                    warn!("board {board_id}: {reason}");
                    break;
                }
                Some(BoardSignal::Exit) | None => break,
            }
        }

        self.evict(&board_id, &entry);
        info!("board {board_id}: disconnected");
    }

    fn not_ready(&self, board_id: &str) -> String {
        format!(
            "board {board_id} did not become ready within {:?}",
            self.connect_timeout
        )
    }

    /// Evicts the entry, then wakes every waiter with the failure.
    ///
    /// Evicting first means a waiter that retries immediately finds no entry
    /// and starts a fresh attempt instead of joining the failed one.
    fn fail(
        &self,
        board_id: &str,
        entry: &watch::Receiver<SessionState>,
        tx: &watch::Sender<SessionState>,
        reason: String,
    ) {
        warn!("board {board_id}: connection failed: {reason}");
        self.evict(board_id, entry);
        tx.send_replace(SessionState::Failed(RelayError::BoardUnavailable {
            board: board_id.to_string(),
            reason,
        }));
    }

    /// Removes the entry for `board_id` if it still belongs to `entry`'s
    /// connection attempt.
    fn evict(&self, board_id: &str, entry: &watch::Receiver<SessionState>) {
        let mut boards = lock(&self.boards);
        if boards
            .get(board_id)
            .is_some_and(|current| current.same_channel(entry))
        {
            boards.remove(board_id);
            debug!("board {board_id}: evicted. Remaining: {}", boards.len());
        }
    }
}

fn abandoned(board_id: &str) -> RelayError {
    RelayError::BoardUnavailable {
        board: board_id.to_string(),
        reason: format!("connection attempt for board {board_id} was abandoned"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
