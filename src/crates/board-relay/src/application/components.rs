//! Per-board component cache and per-component event subscriptions.
//!
//! # Component identity
//!
//! Editors do not hold component handles.  Each request names a component by
//! its kind and construction arguments, and the relay maps that pair to one
//! driver component per board:
//!
//! ```text
//! ("Led", {"pin": 13})  ──fingerprint──►  {"args":{"pin":13},"name":"Led"}
//! ```
//!
//! The fingerprint is the canonical JSON of the pair with object keys sorted
//! and whole-number floats written as integers, so two requests whose
//! arguments are structurally equal reach the same component even if the
//! editor built the objects differently (`{"pin": 13}` and `{"pin": 13.0}`
//! name one component).
//!
//! # Subscriptions
//!
//! A [`ComponentHandle`] remembers which `(subscriber id, event name)` pairs
//! already have a driver listener, so re-sending the same `listenevent`
//! request never doubles the notifications.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use board_driver::{Board, Component, EventListener};
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

use crate::application::broadcaster::ConnectionBroadcaster;
use crate::application::error::RelayError;
use crate::application::lock;
use crate::domain::messages::Outbound;

/// Returns the fingerprint identifying component `kind` built with `args`.
pub fn fingerprint(kind: &str, args: &Value) -> String {
    let mut pair = Map::new();
    pair.insert("args".to_string(), canonical(args));
    pair.insert("name".to_string(), Value::String(kind.to_string()));
    Value::Object(pair).to_string()
}

/// Largest magnitude below which every whole `f64` is exactly representable
/// as an integer.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Rebuilds `value` with every object's keys inserted in sorted order and
/// whole-number floats replaced by integers.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_unstable();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), canonical(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Number(n) => Value::Number(integral(n).unwrap_or_else(|| n.clone())),
        other => other.clone(),
    }
}

/// `n` as an integer if it is a float with no fractional part.
fn integral(n: &Number) -> Option<Number> {
    if !n.is_f64() {
        return None;
    }
    let f = n.as_f64()?;
    if f.fract() != 0.0 || f.abs() > MAX_EXACT_INTEGER {
        return None;
    }
    Some(if f < 0.0 {
        Number::from(f as i64)
    } else {
        Number::from(f as u64)
    })
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Components constructed on one board, keyed by fingerprint.
pub struct ComponentCache {
    board_id: String,
    board: Arc<dyn Board>,
    components: Mutex<HashMap<String, Arc<ComponentHandle>>>,
}

impl ComponentCache {
    pub fn new(board_id: impl Into<String>, board: Arc<dyn Board>) -> Self {
        Self {
            board_id: board_id.into(),
            board,
            components: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the component for `(kind, args)`, constructing it on first use.
    ///
    /// The cache lock is held across construction, so concurrent requests for
    /// the same fingerprint construct exactly one driver component.
    ///
    /// # Errors
    ///
    /// Whatever the driver reports when construction fails; nothing is cached
    /// in that case.
    pub fn get(&self, kind: &str, args: &Value) -> Result<Arc<ComponentHandle>, RelayError> {
        let key = fingerprint(kind, args);
        let mut components = lock(&self.components);
        if let Some(handle) = components.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let component = self.board.construct(kind, args)?;
        info!("board {}: constructed {key}", self.board_id);
        let handle = Arc::new(ComponentHandle::new(
            self.board_id.clone(),
            key.clone(),
            component,
        ));
        components.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of components constructed on this board.
    pub fn len(&self) -> usize {
        lock(&self.components).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// A driver component plus the subscriptions registered on it.
pub struct ComponentHandle {
    board_id: String,
    fingerprint: String,
    component: Arc<dyn Component>,
    subscriptions: Mutex<HashSet<(String, String)>>,
}

impl ComponentHandle {
    fn new(board_id: String, fingerprint: String, component: Arc<dyn Component>) -> Self {
        Self {
            board_id,
            fingerprint,
            component,
            subscriptions: Mutex::new(HashSet::new()),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn kind(&self) -> &str {
        self.component.kind()
    }

    /// Invokes `function` on the driver component.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownFunction`] if the component kind declares no such
    /// function; [`RelayError::CallFailed`] if the function itself fails.
    pub fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, RelayError> {
        Ok(self.component.invoke(function, args)?)
    }

    /// Registers a driver listener that broadcasts an event notification
    /// tagged with `event_id` every time the component emits `event_name`.
    ///
    /// Returns `false` without touching the driver if the pair is already
    /// registered.
    ///
    /// # Errors
    ///
    /// [`RelayError::CallFailed`] if the driver rejects the event name.  The
    /// pair is not recorded in that case, so a later retry reaches the driver
    /// again.
    pub fn subscribe(
        &self,
        event_id: &str,
        event_name: &str,
        broadcaster: &ConnectionBroadcaster,
    ) -> Result<bool, RelayError> {
        let key = (event_id.to_string(), event_name.to_string());
        let mut subscriptions = lock(&self.subscriptions);
        if subscriptions.contains(&key) {
            debug!(
                "board {}: {event_id}.{event_name} already registered on {}",
                self.board_id, self.fingerprint
            );
            return Ok(false);
        }

        let subscription = EventSubscription {
            board: self.board_id.clone(),
            event_id: key.0.clone(),
            event_name: key.1.clone(),
            broadcaster: broadcaster.clone(),
        };
        self.component
            .on(event_name, Arc::new(subscription))
            .map_err(|e| RelayError::CallFailed(e.to_string()))?;

        info!(
            "board {}: {event_id} listening for {event_name} on {}",
            self.board_id, self.fingerprint
        );
        subscriptions.insert(key);
        Ok(true)
    }

    /// Returns `true` if `(event_id, event_name)` has a listener registered.
    pub fn is_subscribed(&self, event_id: &str, event_name: &str) -> bool {
        lock(&self.subscriptions).contains(&(event_id.to_string(), event_name.to_string()))
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// The listener handed to the driver for one `(board, subscriber, event)`.
///
/// It carries its identifiers explicitly and, when fired, turns them into an
/// event notification for every open connection.
pub struct EventSubscription {
    board: String,
    event_id: String,
    event_name: String,
    broadcaster: ConnectionBroadcaster,
}

impl EventSubscription {
    /// The notification this subscription broadcasts.
    pub fn notification(&self) -> Outbound {
        Outbound::event(&self.board, &self.event_id, &self.event_name)
    }
}

impl EventListener for EventSubscription {
    fn fire(&self) {
        self.broadcaster.broadcast(&self.notification());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
