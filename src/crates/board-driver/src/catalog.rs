//! Component capability tables.
//!
//! Every component kind the simulated driver can construct is described by a
//! [`ComponentKind`]: a table from operation name to a plain handler function,
//! plus the list of event names the kind can emit.  Tables are built once, in
//! [`Catalog::standard`], and shared by every board.
//!
//! Looking an operation up by name and rejecting unknown names happens here,
//! before any handler runs, so a typo in a client request can never reach the
//! component state.
//!
//! # Standard kinds
//!
//! | Kind     | Operations                                                   | Events                   |
//! |----------|--------------------------------------------------------------|--------------------------|
//! | `Led`    | on, off, toggle, blink, stop, brightness, isOn               | –                        |
//! | `Button` | –                                                            | press, release, hold     |
//! | `Sensor` | value, scale, threshold                                      | change, data             |
//! | `Servo`  | to, center, min, max, sweep, stop, position                  | move:complete            |
//! | `Pin`    | high, low, write, query                                      | high, low, data          |

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::driver::DriverError;

/// Handler for one component operation.
///
/// Receives the component's mutable state and the positional arguments from
/// the request, and returns the operation's result (`Value::Null` for
/// operations that return nothing).
pub type Operation = fn(&mut ComponentState, &[Value]) -> Result<Value, DriverError>;

/// Mutable state of one simulated component instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentState {
    /// Construction arguments, kept for inspection.
    pub args: Value,
    /// Named state values (`"on"`, `"position"`, ...).
    pub values: Map<String, Value>,
}

impl ComponentState {
    pub fn new(args: Value) -> Self {
        Self {
            args,
            values: Map::new(),
        }
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Returns a state value, or `Value::Null` if it was never set.
    pub fn get(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Null)
    }

    fn flag(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Capability table for one component kind.
#[derive(Clone)]
pub struct ComponentKind {
    name: &'static str,
    operations: HashMap<&'static str, Operation>,
    events: &'static [&'static str],
}

impl std::fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut operations: Vec<_> = self.operations.keys().collect();
        operations.sort_unstable();
        f.debug_struct("ComponentKind")
            .field("name", &self.name)
            .field("operations", &operations)
            .field("events", &self.events)
            .finish()
    }
}

impl ComponentKind {
    /// A kind with no operations that emits `events`.
    pub fn new(name: &'static str, events: &'static [&'static str]) -> Self {
        Self {
            name,
            operations: HashMap::new(),
            events,
        }
    }

    /// Declares an operation.
    pub fn op(mut self, function: &'static str, operation: Operation) -> Self {
        self.operations.insert(function, operation);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Looks up an operation by name.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownFunction`] if the kind declares no such operation.
    pub fn operation(&self, function: &str) -> Result<Operation, DriverError> {
        self.operations
            .get(function)
            .copied()
            .ok_or_else(|| DriverError::UnknownFunction {
                kind: self.name.to_string(),
                function: function.to_string(),
            })
    }

    /// Returns `true` if the kind can emit `event`.
    pub fn emits(&self, event: &str) -> bool {
        self.events.iter().any(|e| *e == event)
    }

    /// # Errors
    ///
    /// [`DriverError::UnknownEvent`] if the kind never emits `event`.
    pub fn check_event(&self, event: &str) -> Result<(), DriverError> {
        if self.emits(event) {
            Ok(())
        } else {
            Err(DriverError::UnknownEvent {
                kind: self.name.to_string(),
                event: event.to_string(),
            })
        }
    }
}

/// All component kinds a driver knows how to construct.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kinds: HashMap<&'static str, ComponentKind>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog with every standard kind registered.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.register(led());
        catalog.register(button());
        catalog.register(sensor());
        catalog.register(servo());
        catalog.register(pin());
        catalog
    }

    /// Adds (or replaces) a kind.
    pub fn register(&mut self, kind: ComponentKind) {
        self.kinds.insert(kind.name, kind);
    }

    /// # Errors
    ///
    /// [`DriverError::UnknownComponentKind`] if no kind named `name` is registered.
    pub fn kind(&self, name: &str) -> Result<&ComponentKind, DriverError> {
        self.kinds
            .get(name)
            .ok_or_else(|| DriverError::UnknownComponentKind(name.to_string()))
    }

    /// Names of all registered kinds, sorted.
    pub fn kind_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.kinds.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn number_arg(args: &[Value], index: usize, name: &str) -> Result<f64, DriverError> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| DriverError::InvalidArguments(format!("{name} must be a number")))
}

fn optional_number_arg(args: &[Value], index: usize, default: f64) -> f64 {
    args.get(index).and_then(Value::as_f64).unwrap_or(default)
}

fn in_range(value: f64, low: f64, high: f64, name: &str) -> Result<f64, DriverError> {
    if (low..=high).contains(&value) {
        Ok(value)
    } else {
        Err(DriverError::InvalidArguments(format!(
            "{name} must be between {low} and {high}, got {value}"
        )))
    }
}

// ── Led ───────────────────────────────────────────────────────────────────────

fn led() -> ComponentKind {
    ComponentKind::new("Led", &[])
        .op("on", led_on)
        .op("off", led_off)
        .op("toggle", led_toggle)
        .op("blink", led_blink)
        .op("stop", led_stop)
        .op("brightness", led_brightness)
        .op("isOn", led_is_on)
}

fn led_on(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("on", Value::Bool(true));
    Ok(Value::Null)
}

fn led_off(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("on", Value::Bool(false));
    state.set("blinking", Value::Bool(false));
    Ok(Value::Null)
}

fn led_toggle(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    let on = !state.flag("on");
    state.set("on", Value::Bool(on));
    Ok(Value::Null)
}

fn led_blink(state: &mut ComponentState, args: &[Value]) -> Result<Value, DriverError> {
    let interval = optional_number_arg(args, 0, 100.0);
    state.set("blinking", Value::Bool(true));
    state.set("interval", json!(interval));
    Ok(Value::Null)
}

fn led_stop(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("blinking", Value::Bool(false));
    Ok(Value::Null)
}

fn led_brightness(state: &mut ComponentState, args: &[Value]) -> Result<Value, DriverError> {
    let level = in_range(number_arg(args, 0, "brightness")?, 0.0, 255.0, "brightness")?;
    state.set("brightness", json!(level));
    state.set("on", Value::Bool(level > 0.0));
    Ok(Value::Null)
}

fn led_is_on(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    Ok(Value::Bool(state.flag("on")))
}

// ── Button ────────────────────────────────────────────────────────────────────

fn button() -> ComponentKind {
    ComponentKind::new("Button", &["press", "release", "hold"])
}

// ── Sensor ────────────────────────────────────────────────────────────────────

fn sensor() -> ComponentKind {
    ComponentKind::new("Sensor", &["change", "data"])
        .op("value", sensor_value)
        .op("scale", sensor_scale)
        .op("threshold", sensor_threshold)
}

fn sensor_value(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    Ok(match state.get("value") {
        Value::Null => json!(0),
        value => value,
    })
}

fn sensor_scale(state: &mut ComponentState, args: &[Value]) -> Result<Value, DriverError> {
    let low = number_arg(args, 0, "low")?;
    let high = number_arg(args, 1, "high")?;
    if low >= high {
        return Err(DriverError::InvalidArguments(format!(
            "scale low ({low}) must be below high ({high})"
        )));
    }
    state.set("scale", json!([low, high]));
    Ok(Value::Null)
}

fn sensor_threshold(state: &mut ComponentState, args: &[Value]) -> Result<Value, DriverError> {
    let threshold = number_arg(args, 0, "threshold")?;
    state.set("threshold", json!(threshold));
    Ok(Value::Null)
}

// ── Servo ─────────────────────────────────────────────────────────────────────

fn servo() -> ComponentKind {
    ComponentKind::new("Servo", &["move:complete"])
        .op("to", servo_to)
        .op("center", servo_center)
        .op("min", servo_min)
        .op("max", servo_max)
        .op("sweep", servo_sweep)
        .op("stop", servo_stop)
        .op("position", servo_position)
}

fn move_servo(state: &mut ComponentState, degrees: f64) -> Result<Value, DriverError> {
    let degrees = in_range(degrees, 0.0, 180.0, "position")?;
    state.set("position", json!(degrees));
    state.set("sweeping", Value::Bool(false));
    Ok(Value::Null)
}

fn servo_to(state: &mut ComponentState, args: &[Value]) -> Result<Value, DriverError> {
    let degrees = number_arg(args, 0, "position")?;
    move_servo(state, degrees)
}

fn servo_center(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    move_servo(state, 90.0)
}

fn servo_min(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    move_servo(state, 0.0)
}

fn servo_max(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    move_servo(state, 180.0)
}

fn servo_sweep(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("sweeping", Value::Bool(true));
    Ok(Value::Null)
}

fn servo_stop(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("sweeping", Value::Bool(false));
    Ok(Value::Null)
}

fn servo_position(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    Ok(match state.get("position") {
        Value::Null => json!(90),
        value => value,
    })
}

// ── Pin ───────────────────────────────────────────────────────────────────────

fn pin() -> ComponentKind {
    ComponentKind::new("Pin", &["high", "low", "data"])
        .op("high", pin_high)
        .op("low", pin_low)
        .op("write", pin_write)
        .op("query", pin_query)
}

fn pin_high(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("value", json!(1));
    Ok(Value::Null)
}

fn pin_low(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    state.set("value", json!(0));
    Ok(Value::Null)
}

fn pin_write(state: &mut ComponentState, args: &[Value]) -> Result<Value, DriverError> {
    let value = in_range(number_arg(args, 0, "value")?, 0.0, 255.0, "value")?;
    state.set("value", json!(value));
    Ok(Value::Null)
}

fn pin_query(state: &mut ComponentState, _args: &[Value]) -> Result<Value, DriverError> {
    let value = match state.get("value") {
        Value::Null => json!(0),
        value => value,
    };
    Ok(json!({ "value": value }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
