//! JSON message types for the editor-facing WebSocket protocol.
//!
//! # Message flow
//!
//! ```text
//! Editor → Relay:  JSON text frame  →  Request
//! Relay  → Editor: Outbound         →  JSON text frame (to every connection)
//! ```
//!
//! # Requests
//!
//! Every request is a JSON object with a `"type"` field selecting the variant,
//! a request `id` that is echoed in the response, and the target `board`:
//!
//! ```json
//! {"type":"connect","id":"1","board":"A"}
//! {"type":"call","id":"2","board":"A","component":"Led","componentArgs":{"pin":13},"function":"on","functionArgs":[]}
//! {"type":"listenevent","id":"3","board":"A","component":"Button","componentArgs":{"pin":2},"eventId":"x","eventName":"press"}
//! ```
//!
//! `componentArgs` defaults to `{}` and `functionArgs` to `[]` when absent or
//! `null`.
//!
//! # Outbound messages
//!
//! ```json
//! {"id":"1","status":200}
//! {"id":"2","status":200,"resp":true}
//! {"id":"3","status":500,"error":{"kind":"BoardUnavailable","message":"board B not found"}}
//! {"type":"event","status":200,"board":"A","eventId":"x","eventName":"press"}
//! ```
//!
//! Outbound messages carry no connection address: every one of them is
//! delivered to every open connection, and clients match responses to their
//! own requests by `id`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Status code of a successful response or an event notification.
pub const STATUS_OK: u16 = 200;

/// Status code of a response to a request that could not be decoded.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Status code of a response to a request whose handling failed.
pub const STATUS_ERROR: u16 = 500;

// ── Editor → Relay ────────────────────────────────────────────────────────────

/// All requests an editor can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
// `tag = "type"` selects the variant from the `"type"` field; `lowercase`
// turns `ListenEvent` into `"listenevent"`.
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Open (or reuse) the connection to a board.
    Connect(ConnectRequest),
    /// Invoke a function on a component of a board.
    Call(CallRequest),
    /// Subscribe to an event of a component of a board.
    ListenEvent(ListenEventRequest),
}

impl Request {
    /// The request id echoed in the response.
    pub fn id(&self) -> &str {
        match self {
            Request::Connect(r) => &r.id,
            Request::Call(r) => &r.id,
            Request::ListenEvent(r) => &r.id,
        }
    }

    /// The board the request targets.
    pub fn board(&self) -> &str {
        match self {
            Request::Connect(r) => &r.board,
            Request::Call(r) => &r.board,
            Request::ListenEvent(r) => &r.board,
        }
    }

    /// Wire name of the request type, for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Connect(_) => "connect",
            Request::Call(_) => "call",
            Request::ListenEvent(_) => "listenevent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub id: String,
    pub board: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub id: String,
    pub board: String,
    /// Component kind name (`"Led"`, `"Button"`, ...).
    pub component: String,
    /// Construction arguments; together with `component` they identify the
    /// component instance on the board.
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub component_args: Value,
    /// Name of the operation to invoke.
    pub function: String,
    /// Positional arguments for the operation.
    #[serde(default, deserialize_with = "list_or_empty")]
    pub function_args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenEventRequest {
    pub id: String,
    pub board: String,
    pub component: String,
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub component_args: Value,
    /// Subscriber id chosen by the editor; echoed in every event notification.
    pub event_id: String,
    /// Component event to listen for (`"press"`, `"change"`, ...).
    pub event_name: String,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or_else(empty_object))
}

fn list_or_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Relay → Editor ────────────────────────────────────────────────────────────

/// Everything the relay broadcasts.
///
/// `untagged` because the three shapes are told apart by their fields, not by
/// a discriminant: events carry `"type":"event"`, failures carry `"error"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Event(EventNotification),
    Failure(ErrorResponse),
    Success(SuccessResponse),
}

impl Outbound {
    /// A status-200 response to request `id`.
    ///
    /// `resp` is the value returned by a called function; `None` (or a null
    /// result) leaves the field out of the wire form entirely.
    pub fn success(id: impl Into<String>, resp: Option<Value>) -> Self {
        Outbound::Success(SuccessResponse {
            id: id.into(),
            status: STATUS_OK,
            resp: resp.filter(|v| !v.is_null()),
        })
    }

    /// An error response.  `id` is `None` only when the request was so
    /// malformed that no id could be recovered from it.
    pub fn failure(id: Option<String>, status: u16, error: ErrorDetail) -> Self {
        Outbound::Failure(ErrorResponse { id, status, error })
    }

    /// An unsolicited event notification.
    pub fn event(
        board: impl Into<String>,
        event_id: impl Into<String>,
        event_name: impl Into<String>,
    ) -> Self {
        Outbound::Event(EventNotification {
            kind: EventTag::Event,
            status: STATUS_OK,
            board: board.into(),
            event_id: event_id.into(),
            event_name: event_name.into(),
        })
    }

    /// Serializes to the JSON text sent in a WebSocket frame.
    ///
    /// # Errors
    ///
    /// Only if a `resp` value cannot be represented as JSON, which cannot
    /// happen for values that were themselves decoded from JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: u16,
    pub error: ErrorDetail,
}

/// Wire form of a failure: the error kind and its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error taxonomy name, e.g. `"BoardUnavailable"` or `"UnknownFunction"`.
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    #[serde(rename = "type")]
    pub kind: EventTag,
    pub status: u16,
    pub board: String,
    pub event_id: String,
    pub event_name: String,
}

/// The fixed `"type":"event"` discriminant of an event notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTag {
    #[serde(rename = "event")]
    Event,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
