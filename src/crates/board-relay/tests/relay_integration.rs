//! Integration tests for request routing against a scripted board driver.
//!
//! # Purpose
//!
//! These tests drive the relay through [`RequestRouter::handle`], exactly as
//! the WebSocket layer does, and observe it from two sides:
//!
//! - **The wire**: every response and event is read back from broadcaster
//!   channels registered the same way a WebSocket session registers.
//! - **The driver**: a [`StubDriver`] counts connection attempts, component
//!   constructions and listener registrations, and lets each test decide when
//!   a board reports ready, fails, or exits.
//!
//! ```text
//! test ──handle(json)──► RequestRouter ──► BoardRegistry ──connect──► StubDriver
//!   ▲                          │                                         │
//!   └──── broadcaster rx ◄─────┘◄──────── EventSubscription ◄── fire ────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use board_driver::{
    Board, BoardDriver, BoardLink, BoardOptions, BoardSignal, Component, DriverError,
    EventListener,
};
use board_relay::application::{RelayContext, RequestRouter};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ── Scripted driver ───────────────────────────────────────────────────────────

/// Counters and hooks shared by the stub driver, its boards and components.
#[derive(Default)]
struct StubState {
    connects: AtomicUsize,
    constructs: AtomicUsize,
    listener_registrations: AtomicUsize,
    signals: Mutex<HashMap<String, mpsc::UnboundedSender<BoardSignal>>>,
    listeners: Mutex<Vec<(String, Arc<dyn EventListener>)>>,
}

/// A driver whose boards report ready immediately (`auto_ready`) or only when
/// the test calls [`StubDriver::signal`].
#[derive(Clone)]
struct StubDriver {
    auto_ready: bool,
    state: Arc<StubState>,
}

impl StubDriver {
    fn auto_ready() -> Self {
        Self {
            auto_ready: true,
            state: Arc::default(),
        }
    }

    fn manual() -> Self {
        Self {
            auto_ready: false,
            state: Arc::default(),
        }
    }

    fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    fn constructs(&self) -> usize {
        self.state.constructs.load(Ordering::SeqCst)
    }

    fn listener_registrations(&self) -> usize {
        self.state.listener_registrations.load(Ordering::SeqCst)
    }

    /// Sends `signal` on the most recent connection to `board`.
    fn signal(&self, board: &str, signal: BoardSignal) {
        let signals = self.state.signals.lock().unwrap();
        signals[board].send(signal).unwrap();
    }

    /// Fires every registered listener for `event`, as a component would.
    fn fire(&self, event: &str) {
        let listeners: Vec<_> = self
            .state
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.fire();
        }
    }
}

#[async_trait]
impl BoardDriver for StubDriver {
    async fn connect(&self, options: BoardOptions) -> Result<BoardLink, DriverError> {
        let board = Arc::new(StubBoard {
            id: options.id.clone(),
            state: Arc::clone(&self.state),
        });
        let (link, tx) = BoardLink::channel(board);
        if self.auto_ready {
            tx.send(BoardSignal::Ready).unwrap();
        }
        self.state.signals.lock().unwrap().insert(options.id, tx);
        // Counted last so a test that saw the count can signal the board.
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(link)
    }
}

struct StubBoard {
    id: String,
    state: Arc<StubState>,
}

impl Board for StubBoard {
    fn id(&self) -> &str {
        &self.id
    }

    fn construct(&self, kind: &str, _args: &Value) -> Result<Arc<dyn Component>, DriverError> {
        if kind == "Toaster" {
            return Err(DriverError::UnknownComponentKind(kind.to_string()));
        }
        self.state.constructs.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubComponent {
            kind: kind.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Accepts `on`/`off`, emits only `press`.
struct StubComponent {
    kind: String,
    state: Arc<StubState>,
}

impl Component for StubComponent {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn invoke(&self, function: &str, _args: &[Value]) -> Result<Value, DriverError> {
        match function {
            "on" | "off" => Ok(Value::Null),
            _ => Err(DriverError::UnknownFunction {
                kind: self.kind.clone(),
                function: function.to_string(),
            }),
        }
    }

    fn on(&self, event: &str, listener: Arc<dyn EventListener>) -> Result<(), DriverError> {
        if event != "press" {
            return Err(DriverError::UnknownEvent {
                kind: self.kind.clone(),
                event: event.to_string(),
            });
        }
        self.state.listener_registrations.fetch_add(1, Ordering::SeqCst);
        self.state
            .listeners
            .lock()
            .unwrap()
            .push((event.to_string(), listener));
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn router(driver: &StubDriver) -> RequestRouter {
    RequestRouter::new(RelayContext::new(
        Arc::new(driver.clone()),
        Duration::from_secs(3),
    ))
}

/// Everything queued on a connection so far, decoded.
fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(text) = rx.try_recv() {
        messages.push(serde_json::from_str(&text).unwrap());
    }
    messages
}

/// Polls until `check` holds or a second passes.
async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

const CALL_LED_ON: &str = r#"{"type":"call","id":"2","board":"A","component":"Led","componentArgs":{"pin":13},"function":"on","functionArgs":[]}"#;

const LISTEN_PRESS: &str = r#"{"type":"listenevent","id":"4","board":"A","component":"Button","componentArgs":{"pin":2},"eventId":"x","eventName":"press"}"#;

// ── Board connection ──────────────────────────────────────────────────────────

/// Connect requests for one board that arrive before it is ready share one
/// driver connection, and each gets exactly one success once it is ready.
#[tokio::test]
async fn test_concurrent_connects_make_one_driver_connection() {
    // Arrange
    let driver = StubDriver::manual();
    let router = router(&driver);
    let (_id, mut rx) = router.context().broadcaster().register();

    // Act: three connects in flight, then the board reports ready
    let pending: Vec<_> = ["1", "2", "3"]
        .into_iter()
        .map(|id| {
            let router = router.clone();
            let frame = format!(r#"{{"type":"connect","id":"{id}","board":"A"}}"#);
            tokio::spawn(async move { router.handle(&frame).await })
        })
        .collect();
    assert!(eventually(|| driver.connects() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    driver.signal("A", BoardSignal::Ready);
    for task in pending {
        task.await.unwrap();
    }

    // Assert
    assert_eq!(driver.connects(), 1);
    let mut ids: Vec<_> = drain(&mut rx)
        .into_iter()
        .inspect(|m| assert_eq!(m["status"], json!(200)))
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_connect_succeeds_when_board_signals_ready() {
    let driver = StubDriver::manual();
    let router = router(&driver);
    let (_id, mut rx) = router.context().broadcaster().register();

    let pending = tokio::spawn({
        let router = router.clone();
        async move {
            router
                .handle(r#"{"type":"connect","id":"1","board":"A"}"#)
                .await
        }
    });
    assert!(eventually(|| driver.connects() == 1).await);
    driver.signal("A", BoardSignal::Ready);
    pending.await.unwrap();

    assert_eq!(drain(&mut rx), vec![json!({"id": "1", "status": 200})]);
}

/// A board that signals an error is reported unavailable and forgotten, so the
/// next connect tries again.
#[tokio::test]
async fn test_connect_error_evicts_board_and_allows_retry() {
    // Arrange
    let driver = StubDriver::manual();
    let router = router(&driver);
    let (_id, mut rx) = router.context().broadcaster().register();

    // Act
    let pending = tokio::spawn({
        let router = router.clone();
        async move {
            router
                .handle(r#"{"type":"connect","id":"3","board":"B"}"#)
                .await
        }
    });
    assert!(eventually(|| driver.connects() == 1).await);
    driver.signal("B", BoardSignal::Error("board B not found".to_string()));
    pending.await.unwrap();

    // Assert
    assert_eq!(
        drain(&mut rx),
        vec![json!({
            "id": "3",
            "status": 500,
            "error": {"kind": "BoardUnavailable", "message": "board B not found"}
        })]
    );
    assert!(!router.context().registry().contains("B"));

    // A retry reaches the driver again
    let retry = tokio::spawn({
        let router = router.clone();
        async move {
            router
                .handle(r#"{"type":"connect","id":"5","board":"B"}"#)
                .await
        }
    });
    assert!(eventually(|| driver.connects() == 2).await);
    driver.signal("B", BoardSignal::Ready);
    retry.await.unwrap();
    assert_eq!(drain(&mut rx), vec![json!({"id": "5", "status": 200})]);
}

#[tokio::test]
async fn test_exit_after_ready_forces_reconnect() {
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    router
        .handle(r#"{"type":"connect","id":"1","board":"A"}"#)
        .await;

    driver.signal("A", BoardSignal::Exit);
    assert!(eventually(|| !router.context().registry().contains("A")).await);
    router
        .handle(r#"{"type":"connect","id":"2","board":"A"}"#)
        .await;

    assert_eq!(driver.connects(), 2);
}

// ── Calls ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_call_led_on_after_connect() {
    // Arrange
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    let (_id, mut rx) = router.context().broadcaster().register();

    // Act
    router
        .handle(r#"{"type":"connect","id":"1","board":"A"}"#)
        .await;
    router.handle(CALL_LED_ON).await;

    // Assert
    assert_eq!(
        drain(&mut rx),
        vec![
            json!({"id": "1", "status": 200}),
            json!({"id": "2", "status": 200}),
        ]
    );
}

/// An unknown function yields one error and leaves board and component state
/// exactly as it was.
#[tokio::test]
async fn test_unknown_function_changes_no_state() {
    // Arrange: board A connected and its LED constructed
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    router.handle(CALL_LED_ON).await;
    let session = router.context().registry().acquire("A").await.unwrap();
    let (_id, mut rx) = router.context().broadcaster().register();

    // Act
    router
        .handle(r#"{"type":"call","id":"6","board":"A","component":"Led","componentArgs":{"pin":13},"function":"explode","functionArgs":[]}"#)
        .await;

    // Assert
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], json!("6"));
    assert_eq!(messages[0]["status"], json!(500));
    assert_eq!(messages[0]["error"]["kind"], json!("UnknownFunction"));
    assert_eq!(router.context().registry().len(), 1);
    assert_eq!(session.components().len(), 1);
    assert_eq!(driver.constructs(), 1);
    assert_eq!(driver.connects(), 1);
}

#[tokio::test]
async fn test_unknown_component_kind_is_reported() {
    let driver = StubDriver::auto_ready();
    let router = router(&driver);

    let out = router
        .handle(r#"{"type":"call","id":"7","board":"A","component":"Toaster","function":"on"}"#)
        .await;

    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value["error"]["kind"], json!("UnknownComponentKind"));
    assert_eq!(driver.constructs(), 0);
}

/// Structurally equal construction arguments reach the same component.
#[tokio::test]
async fn test_equal_component_args_construct_once() {
    let driver = StubDriver::auto_ready();
    let router = router(&driver);

    router
        .handle(r#"{"type":"call","id":"1","board":"A","component":"Led","componentArgs":{"pin":13,"controller":"PCA9685"},"function":"on"}"#)
        .await;
    router
        .handle(r#"{"type":"call","id":"2","board":"A","component":"Led","componentArgs":{"controller":"PCA9685","pin":13},"function":"off"}"#)
        .await;

    assert_eq!(driver.constructs(), 1);
}

// ── Events ────────────────────────────────────────────────────────────────────

/// An event reaches every open connection, not only the subscriber's.
#[tokio::test]
async fn test_event_is_delivered_to_every_connection() {
    // Arrange
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    let broadcaster = router.context().broadcaster();
    let (_a, mut rx_a) = broadcaster.register();
    let (_b, mut rx_b) = broadcaster.register();
    router.handle(LISTEN_PRESS).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // Act
    driver.fire("press");

    // Assert
    let expected =
        json!({"type": "event", "status": 200, "board": "A", "eventId": "x", "eventName": "press"});
    assert_eq!(drain(&mut rx_a), vec![expected.clone()]);
    assert_eq!(drain(&mut rx_b), vec![expected]);
}

#[tokio::test]
async fn test_event_skips_unregistered_connection() {
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    let broadcaster = router.context().broadcaster();
    let (gone, mut rx_gone) = broadcaster.register();
    let (_kept, mut rx_kept) = broadcaster.register();
    router.handle(LISTEN_PRESS).await;
    drain(&mut rx_kept);
    drain(&mut rx_gone);

    broadcaster.unregister(gone);
    driver.fire("press");

    assert!(drain(&mut rx_gone).is_empty());
    assert_eq!(drain(&mut rx_kept).len(), 1);
}

/// Re-sending the same listenevent request registers one driver listener, so
/// each event is still delivered once.
#[tokio::test]
async fn test_repeated_listen_event_registers_once() {
    // Arrange
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    let (_id, mut rx) = router.context().broadcaster().register();

    // Act
    router.handle(LISTEN_PRESS).await;
    router.handle(LISTEN_PRESS).await;
    let responses = drain(&mut rx);
    driver.fire("press");

    // Assert
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r["status"] == json!(200)));
    assert_eq!(driver.listener_registrations(), 1);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_unknown_event_is_call_failed_and_not_recorded() {
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    let frame = r#"{"type":"listenevent","id":"8","board":"A","component":"Button","componentArgs":{"pin":2},"eventId":"x","eventName":"explode"}"#;

    let first = serde_json::to_value(router.handle(frame).await).unwrap();
    let second = serde_json::to_value(router.handle(frame).await).unwrap();

    assert_eq!(first["error"]["kind"], json!("CallFailed"));
    assert_eq!(second["error"]["kind"], json!("CallFailed"));
    assert_eq!(driver.listener_registrations(), 0);
}

// ── Decoding ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_frame_gets_bad_request_and_touches_no_board() {
    let driver = StubDriver::auto_ready();
    let router = router(&driver);
    let (_id, mut rx) = router.context().broadcaster().register();

    router.handle(r#"{"type":"reboot","id":"9","board":"A"}"#).await;

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], json!("9"));
    assert_eq!(messages[0]["status"], json!(400));
    assert_eq!(driver.connects(), 0);
}
