//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the pinpad rules: command parsing, the
//! connection/validation state machine, advertising policy and event
//! dispatch. All interaction with the radio, flash and GPIO happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod advertising;
pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
pub mod triggers;
