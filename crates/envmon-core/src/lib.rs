//! # envmon-core
//!
//! Core state and protocol logic for the environmental monitor.
//!
//! This crate provides:
//! - Data model types (Measurement, ConnectionStatus, BindStatus, LinkView)
//! - Shared state read and written by the display and network tasks
//! - Signal-strength and icon animation logic
//! - Sensor rotation and display refresh cadence
//! - HTTP request-line parsing and routing (without I/O)
//! - Device configuration
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! so the same logic backs both the host build and a bare-metal port.

pub mod config;
pub mod http;
pub mod model;
pub mod schedule;
pub mod signal;
pub mod state;

pub use config::{ConfigError, DeviceConfig};
pub use model::*;
pub use state::{SharedState, ShutdownSignal, TimeSync};
