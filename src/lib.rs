//! Supercapacitor energy buffer controller
//!
//! Hardware-independent core of the supercap firmware: measurement snapshot,
//! safety monitor, energy accounting, the mode state machine with its control
//! laws, the chassis CAN protocol and the per-tick supervisor that wires the
//! core to injected hardware capabilities.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod can_protocol;
pub mod command;
pub mod config;
pub mod control;
pub mod controller;
pub mod energy;
pub mod error;
pub mod hal;
pub mod model;
pub mod safety;
pub mod sensors;
pub mod supervisor;
pub mod telemetry;

pub use controller::Controller;
pub use error::{InitError, PowerStageError, SensorError, TelemetryError};
pub use model::{Actuation, ErrorFlags, Measurements, Mode, SystemState};
pub use supervisor::Supervisor;
