//! Application-level error type.
//!
//! Every failure inside a request chain ends up as a [`RelayError`], and every
//! [`RelayError`] ends up on the wire as an error response.  Nothing here is
//! ever allowed to take down the listener.

use board_driver::DriverError;
use thiserror::Error;

use crate::domain::messages::{ErrorDetail, STATUS_BAD_REQUEST, STATUS_ERROR};

/// Errors that can occur while handling a request.
///
/// `Clone` because a single failed board connection attempt is reported to
/// every request that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The board connection attempt failed, timed out, or was abandoned.
    #[error("{reason}")]
    BoardUnavailable { board: String, reason: String },

    /// The driver cannot construct components of this kind.
    #[error("unknown component kind: {0}")]
    UnknownComponentKind(String),

    /// The component kind declares no function with this name.
    #[error("{component} has no function named {function}")]
    UnknownFunction { component: String, function: String },

    /// The driver call itself failed (bad arguments, unknown event, ...).
    #[error("{0}")]
    CallFailed(String),

    /// The inbound message was not valid JSON or not a known request.
    #[error("malformed request: {0}")]
    Decode(String),
}

impl RelayError {
    /// Taxonomy name sent to clients in `error.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BoardUnavailable { .. } => "BoardUnavailable",
            RelayError::UnknownComponentKind(_) => "UnknownComponentKind",
            RelayError::UnknownFunction { .. } => "UnknownFunction",
            RelayError::CallFailed(_) => "CallFailed",
            RelayError::Decode(_) => "DecodeError",
        }
    }

    /// Response status for this error.
    pub fn status(&self) -> u16 {
        match self {
            RelayError::Decode(_) => STATUS_BAD_REQUEST,
            _ => STATUS_ERROR,
        }
    }

    /// Wire form of this error.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<DriverError> for RelayError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::BoardNotFound(board) => RelayError::BoardUnavailable {
                reason: format!("board {board} not found"),
                board,
            },
            DriverError::UnknownComponentKind(kind) => RelayError::UnknownComponentKind(kind),
            DriverError::UnknownFunction { kind, function } => RelayError::UnknownFunction {
                component: kind,
                function,
            },
            other => RelayError::CallFailed(other.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
