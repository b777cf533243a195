//! # board-driver
//!
//! The hardware-abstraction layer consumed by `board-relay`.
//!
//! The relay never talks to a microcontroller directly.  It talks to a
//! *driver*: something that can open a connection to a board identified by a
//! string, construct components on that board (an LED on pin 13, a button on
//! pin 2, ...), invoke named operations on those components and register
//! listeners for component events.
//!
//! This crate defines that capability as a small set of traits and ships one
//! implementation of it, an in-memory [`SimulatedDriver`], so the relay can
//! run end to end on a machine with nothing plugged in.
//!
//! # Modules
//!
//! - **`driver`** – The capability traits ([`BoardDriver`], [`Board`],
//!   [`Component`], [`EventListener`]) and the signal/option value types.
//! - **`catalog`** – Per-kind capability tables: operation name → handler,
//!   plus the event names each kind can emit.  Unknown names are rejected
//!   before anything is invoked.
//! - **`simulated`** – Virtual boards backed by the catalog.

pub mod catalog;
pub mod driver;
pub mod simulated;

// Re-export the most-used types at the crate root so callers can write
// `board_driver::BoardDriver` instead of `board_driver::driver::BoardDriver`.
pub use catalog::{Catalog, ComponentKind, ComponentState, Operation};
pub use driver::{
    Board, BoardDriver, BoardLink, BoardOptions, BoardSignal, Component, DriverError,
    EventListener,
};
pub use simulated::SimulatedDriver;
