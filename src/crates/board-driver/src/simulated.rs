//! In-memory simulated boards.
//!
//! [`SimulatedDriver`] implements [`BoardDriver`] without any hardware.  Every
//! component it constructs is backed by a capability table from the
//! [`Catalog`], so unknown kinds, functions and events are rejected exactly as
//! a real driver would reject them.
//!
//! Besides serving the relay binary when no hardware is attached, the driver
//! exposes a small control surface for tests and demos:
//!
//! - [`SimulatedDriver::emit`] fires an event on every matching component.
//! - [`SimulatedDriver::disconnect`] makes a board exit.
//! - [`SimulatedDriver::connect_count`] reports how many connection attempts
//!   the driver has seen.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::catalog::{Catalog, ComponentKind, ComponentState};
use crate::driver::{
    Board, BoardDriver, BoardLink, BoardOptions, BoardSignal, Component, DriverError,
    EventListener,
};

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Simulated state is plain data; a panic in one listener must not make the
/// whole board unusable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A driver whose boards live entirely in memory.
///
/// Cloning is cheap; clones share the same set of simulated boards.
#[derive(Clone)]
pub struct SimulatedDriver {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    catalog: Arc<Catalog>,
    /// Board ids that answer.  `None` means every id answers.
    known_boards: Option<HashSet<String>>,
    ready_delay: Duration,
    connects: AtomicUsize,
    boards: Mutex<HashMap<String, ConnectedBoard>>,
}

struct ConnectedBoard {
    board: Arc<SimulatedBoard>,
    signals: mpsc::UnboundedSender<BoardSignal>,
}

impl SimulatedDriver {
    /// A driver on which every board id connects.
    pub fn new() -> Self {
        Self::build(None, Duration::ZERO)
    }

    /// A driver on which only the listed board ids connect; every other id
    /// reports `board <id> not found`.
    pub fn with_boards<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(Some(ids.into_iter().map(Into::into).collect()), Duration::ZERO)
    }

    /// Sets how long a board takes to report ready (or missing).
    pub fn ready_delay(self, delay: Duration) -> Self {
        Self::build(self.inner.known_boards.clone(), delay)
    }

    fn build(known_boards: Option<HashSet<String>>, ready_delay: Duration) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                catalog: Arc::new(Catalog::standard()),
                known_boards,
                ready_delay,
                connects: AtomicUsize::new(0),
                boards: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of times [`BoardDriver::connect`] has been called.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Fires `event` on every component of `kind` on board `board_id`.
    ///
    /// Returns the number of listeners that were notified.
    pub fn emit(&self, board_id: &str, kind: &str, event: &str) -> usize {
        let board = match lock(&self.inner.boards).get(board_id) {
            Some(connected) => Arc::clone(&connected.board),
            None => return 0,
        };
        let fired = board.emit(kind, event);
        debug!("simulated board {board_id}: {kind} emitted {event} to {fired} listener(s)");
        fired
    }

    /// Makes board `board_id` exit.  Returns `false` if it was not connected.
    pub fn disconnect(&self, board_id: &str) -> bool {
        match lock(&self.inner.boards).remove(board_id) {
            Some(connected) => {
                info!("simulated board {board_id}: exit");
                // The receiver may already be gone if nobody is tracking the board.
                let _ = connected.signals.send(BoardSignal::Exit);
                true
            }
            None => false,
        }
    }

    fn answers(&self, id: &str) -> bool {
        self.inner
            .known_boards
            .as_ref()
            .map_or(true, |known| known.contains(id))
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoardDriver for SimulatedDriver {
    async fn connect(&self, options: BoardOptions) -> Result<BoardLink, DriverError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let board = Arc::new(SimulatedBoard::new(
            options.id.clone(),
            Arc::clone(&self.inner.catalog),
        ));
        let (link, signals) = BoardLink::channel(Arc::clone(&board) as Arc<dyn Board>);

        // A board that does not answer within its own timeout is missing.
        let delay = self.inner.ready_delay;
        let (signal, wait) = if self.answers(&options.id) && delay <= options.timeout {
            lock(&self.inner.boards).insert(
                options.id.clone(),
                ConnectedBoard {
                    board,
                    signals: signals.clone(),
                },
            );
            (BoardSignal::Ready, delay)
        } else {
            let reason = DriverError::BoardNotFound(options.id).to_string();
            (BoardSignal::Error(reason), delay.min(options.timeout))
        };

        tokio::spawn(async move {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            // The caller may have stopped listening already.
            let _ = signals.send(signal);
        });

        Ok(link)
    }
}

// ── Board ─────────────────────────────────────────────────────────────────────

/// One simulated board and the components constructed on it.
pub struct SimulatedBoard {
    id: String,
    catalog: Arc<Catalog>,
    components: Mutex<Vec<Arc<SimulatedComponent>>>,
}

impl SimulatedBoard {
    fn new(id: String, catalog: Arc<Catalog>) -> Self {
        Self {
            id,
            catalog,
            components: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, kind: &str, event: &str) -> usize {
        let targets: Vec<_> = lock(&self.components)
            .iter()
            .filter(|c| c.kind.name() == kind)
            .cloned()
            .collect();
        targets.iter().map(|c| c.fire(event)).sum()
    }
}

impl Board for SimulatedBoard {
    fn id(&self) -> &str {
        &self.id
    }

    fn construct(&self, kind: &str, args: &Value) -> Result<Arc<dyn Component>, DriverError> {
        let kind = self.catalog.kind(kind)?.clone();
        if args.is_array() {
            return Err(DriverError::InvalidArguments(format!(
                "{} expects an options object, a pin number or a pin name",
                kind.name()
            )));
        }
        let component = Arc::new(SimulatedComponent::new(kind, args.clone()));
        lock(&self.components).push(Arc::clone(&component));
        Ok(component)
    }
}

// ── Component ─────────────────────────────────────────────────────────────────

/// A component whose operations run against in-memory state.
pub struct SimulatedComponent {
    kind: ComponentKind,
    state: Mutex<ComponentState>,
    listeners: Mutex<HashMap<String, Vec<Arc<dyn EventListener>>>>,
}

impl SimulatedComponent {
    fn new(kind: ComponentKind, args: Value) -> Self {
        Self {
            kind,
            state: Mutex::new(ComponentState::new(args)),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn fire(&self, event: &str) -> usize {
        // Snapshot first: a listener may register more listeners.
        let listeners = lock(&self.listeners).get(event).cloned().unwrap_or_default();
        for listener in &listeners {
            listener.fire();
        }
        listeners.len()
    }
}

impl Component for SimulatedComponent {
    fn kind(&self) -> &str {
        self.kind.name()
    }

    fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, DriverError> {
        let operation = self.kind.operation(function)?;
        let mut state = lock(&self.state);
        operation(&mut state, args)
    }

    fn on(&self, event: &str, listener: Arc<dyn EventListener>) -> Result<(), DriverError> {
        self.kind.check_event(event)?;
        lock(&self.listeners)
            .entry(event.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    #[derive(Default)]
    struct CountingListener {
        fired: AtomicUsize,
    }

    impl EventListener for CountingListener {
        fn fire(&self) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options(id: &str) -> BoardOptions {
        BoardOptions::new(id, Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_known_board_signals_ready() {
        // Arrange
        let driver = SimulatedDriver::with_boards(["A"]);

        // Act
        let mut link = driver.connect(options("A")).await.unwrap();

        // Assert
        assert_eq!(link.signals.recv().await, Some(BoardSignal::Ready));
        assert_eq!(link.board.id(), "A");
        assert_eq!(driver.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_board_signals_not_found() {
        let driver = SimulatedDriver::with_boards(["A"]);
        let mut link = driver.connect(options("B")).await.unwrap();
        assert_eq!(
            link.signals.recv().await,
            Some(BoardSignal::Error("board B not found".to_string()))
        );
    }

    #[tokio::test]
    async fn test_open_driver_accepts_any_board() {
        let driver = SimulatedDriver::new();
        let mut link = driver.connect(options("/dev/ttyACM0")).await.unwrap();
        assert_eq!(link.signals.recv().await, Some(BoardSignal::Ready));
    }

    #[tokio::test]
    async fn test_ready_delay_beyond_timeout_reports_not_found() {
        // Arrange: the board would take longer than the caller allows
        let driver = SimulatedDriver::new().ready_delay(Duration::from_millis(50));
        let opts = BoardOptions::new("slow", Duration::from_millis(10));

        // Act
        let mut link = driver.connect(opts).await.unwrap();

        // Assert
        assert!(matches!(link.signals.recv().await, Some(BoardSignal::Error(_))));
    }

    #[tokio::test]
    async fn test_disconnect_sends_exit() {
        let driver = SimulatedDriver::new();
        let mut link = driver.connect(options("A")).await.unwrap();
        assert_eq!(link.signals.recv().await, Some(BoardSignal::Ready));

        assert!(driver.disconnect("A"));
        assert_eq!(link.signals.recv().await, Some(BoardSignal::Exit));
        assert!(!driver.disconnect("A"), "second disconnect is a no-op");
    }

    #[tokio::test]
    async fn test_construct_and_invoke_led() {
        // Arrange
        let driver = SimulatedDriver::new();
        let link = driver.connect(options("A")).await.unwrap();

        // Act
        let led = assert_ok!(link.board.construct("Led", &json!({"pin": 13})));
        assert_ok!(led.invoke("on", &[]));

        // Assert
        assert_eq!(led.kind(), "Led");
        assert_eq!(assert_ok!(led.invoke("isOn", &[])), json!(true));
    }

    #[tokio::test]
    async fn test_construct_unknown_kind_fails() {
        let driver = SimulatedDriver::new();
        let link = driver.connect(options("A")).await.unwrap();
        let result = link.board.construct("Toaster", &json!({}));
        assert_eq!(
            result.err().map(|e| e.to_string()),
            Some("unknown component kind: Toaster".to_string())
        );
    }

    #[tokio::test]
    async fn test_construct_rejects_array_arguments() {
        let driver = SimulatedDriver::new();
        let link = driver.connect(options("A")).await.unwrap();
        let result = link.board.construct("Led", &json!([13]));
        assert!(matches!(result, Err(DriverError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_emit_reaches_registered_listener() {
        // Arrange
        let driver = SimulatedDriver::new();
        let link = driver.connect(options("A")).await.unwrap();
        let button = link.board.construct("Button", &json!({"pin": 2})).unwrap();
        let listener = Arc::new(CountingListener::default());
        button.on("press", listener.clone()).unwrap();

        // Act
        let fired = driver.emit("A", "Button", "press");

        // Assert
        assert_eq!(fired, 1);
        assert_eq!(listener.fired.load(Ordering::SeqCst), 1);
        assert_eq!(driver.emit("A", "Button", "release"), 0);
        assert_eq!(driver.emit("Z", "Button", "press"), 0);
    }

    #[tokio::test]
    async fn test_on_unknown_event_fails() {
        let driver = SimulatedDriver::new();
        let link = driver.connect(options("A")).await.unwrap();
        let led = link.board.construct("Led", &json!(13)).unwrap();
        let result = led.on("press", Arc::new(CountingListener::default()));
        assert!(matches!(result, Err(DriverError::UnknownEvent { .. })));
    }
}
