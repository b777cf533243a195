//! Driver capability traits.
//!
//! A driver connects boards; a board constructs components; a component
//! exposes named operations and named events.
//!
//! # Connection lifecycle
//!
//! ```text
//! connect(options) ──► BoardLink { board, signals }
//!                              │
//!                 signals: Ready ──► board usable
//!                          Error ──► connection attempt failed
//!                          Exit  ──► board went away after Ready
//! ```
//!
//! `connect` returns as soon as the driver has created its connection object.
//! Whether the board actually answers is reported later on the signal channel,
//! which lets the caller decide how long it is willing to wait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a driver, a board or a component.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// No board answered for the requested identifier.
    #[error("board {0} not found")]
    BoardNotFound(String),

    /// The driver has no constructor for this component kind.
    #[error("unknown component kind: {0}")]
    UnknownComponentKind(String),

    /// The component kind does not declare an operation with this name.
    #[error("{kind} has no function named {function}")]
    UnknownFunction { kind: String, function: String },

    /// The component kind does not emit an event with this name.
    #[error("{kind} does not emit event {event}")]
    UnknownEvent { kind: String, event: String },

    /// Construction or operation arguments had the wrong shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The operation itself failed.
    #[error("{0}")]
    Failed(String),
}

/// Options passed to [`BoardDriver::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardOptions {
    /// Board identifier (serial port path, board name, ...).
    pub id: String,
    /// Whether the driver should start an interactive REPL.  Always `false`
    /// for relayed boards.
    pub repl: bool,
    /// How long the driver may take before it reports the board missing.
    pub timeout: Duration,
}

impl BoardOptions {
    /// Options for a relayed board: no REPL, the given connection timeout.
    pub fn new(id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            repl: false,
            timeout,
        }
    }
}

/// Asynchronous lifecycle notification from a connected board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardSignal {
    /// The board answered and is ready to construct components.
    Ready,
    /// The connection attempt (or an established connection) failed.
    Error(String),
    /// The board disconnected.
    Exit,
}

/// The driver's connection object for one board.
pub struct BoardLink {
    /// Handle used to construct components once the board is ready.
    pub board: Arc<dyn Board>,
    /// Lifecycle signals.  A closed channel means the same as [`BoardSignal::Exit`].
    pub signals: mpsc::UnboundedReceiver<BoardSignal>,
}

impl BoardLink {
    /// Creates a link for `board` and returns the sender the driver uses to
    /// report lifecycle signals on it.
    pub fn channel(board: Arc<dyn Board>) -> (Self, mpsc::UnboundedSender<BoardSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { board, signals: rx }, tx)
    }
}

/// Opens connections to boards.
#[async_trait]
pub trait BoardDriver: Send + Sync {
    /// Starts connecting to the board described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the driver could not even create its
    /// connection object.  A board that does not answer is reported as
    /// [`BoardSignal::Error`] on the returned link instead.
    async fn connect(&self, options: BoardOptions) -> Result<BoardLink, DriverError>;
}

/// A connected board.
pub trait Board: Send + Sync {
    /// The identifier the board was connected with.
    fn id(&self) -> &str;

    /// Constructs a new component of `kind` with construction arguments `args`.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownComponentKind`] if the driver has no constructor
    /// for `kind`; [`DriverError::InvalidArguments`] if `args` is malformed.
    fn construct(&self, kind: &str, args: &Value) -> Result<Arc<dyn Component>, DriverError>;
}

/// A component constructed on a board.
pub trait Component: Send + Sync {
    /// Kind name the component was constructed with (`"Led"`, `"Button"`, ...).
    fn kind(&self) -> &str;

    /// Invokes the operation `function` with positional arguments.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownFunction`] if the kind declares no such
    /// operation, or whatever error the operation itself reports.
    fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, DriverError>;

    /// Registers `listener` to be fired every time the component emits `event`.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownEvent`] if the kind never emits `event`.
    fn on(&self, event: &str, listener: Arc<dyn EventListener>) -> Result<(), DriverError>;
}

/// Receives event notifications from a component.
///
/// Drivers call `fire` from whatever context the event occurs in, so
/// implementations must not block.
pub trait EventListener: Send + Sync {
    fn fire(&self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
