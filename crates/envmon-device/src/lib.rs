//! # envmon-device
//!
//! Device tasks of the environmental monitor, on the tokio runtime.
//!
//! This crate provides:
//! - Capability traits for sensors, the WiFi radio, display, buttons and
//!   a time source ([`hal`])
//! - The WiFi connection manager with its retry protocol
//! - The single-connection HTTP responder
//! - The display tick loop
//! - The orchestrator tying them together
//! - Host implementations of the capabilities and an SNTP client
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use envmon_core::DeviceConfig;
//! use envmon_device::sim::{sensor_from_spec, HostRadio};
//! use envmon_device::{Device, Orchestrator, SensorArray};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load("config/envmon.toml")?;
//! let mut sensors = SensorArray::new();
//! for spec in &config.sensors {
//!     sensors.push("sensor", sensor_from_spec(spec));
//! }
//! let device = Device {
//!     sensors,
//!     radio: Arc::new(HostRadio::new(config.radio.clone())),
//!     panel: None,
//!     clock: None,
//! };
//! Orchestrator::new(config, device).run().await;
//! # Ok(())
//! # }
//! ```

pub mod display;
pub mod hal;
pub mod ntp;
pub mod orchestrator;
pub mod sensors;
pub mod server;
pub mod sim;
pub mod wifi;

pub use display::{DisplaySettings, DisplayTask, Panel};
pub use ntp::SntpClient;
pub use orchestrator::{Device, Orchestrator, RunOutcome};
pub use sensors::{SensorArray, SensorHandle};
pub use server::{BindError, ResponseServer};
pub use wifi::{ConnectionManager, RetryPolicy, WifiError};
