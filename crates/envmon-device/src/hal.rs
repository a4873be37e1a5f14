//! Hardware capabilities the device tasks are written against.
//!
//! Each trait is the thin surface of one driver: sensors, the WiFi radio,
//! the status display, buttons and a wall-clock time source. Drivers are
//! synchronous; the tasks decide when to call them and sleep in between.

use chrono::{DateTime, Utc};
use envmon_core::signal::IconState;
use envmon_core::Measurement;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors reported by a sensor driver.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The sensor did not answer in time.
    #[error("sensor did not respond")]
    NoResponse,

    /// The sensor answered with data that failed validation.
    #[error("invalid sensor data: {0}")]
    InvalidData(String),

    #[error("sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A temperature/humidity sensor.
pub trait SensorDriver: Send {
    /// Take one reading.
    fn read(&mut self) -> Result<Measurement, SensorError>;
}

/// Link status codes reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    Idle,
    Connecting,
    WrongPassword,
    NoAccessPoint,
    ConnectFailed,
    GotIp,
}

impl RadioStatus {
    pub fn code(self) -> i32 {
        match self {
            RadioStatus::Idle => 0,
            RadioStatus::Connecting => 1,
            RadioStatus::GotIp => 3,
            RadioStatus::ConnectFailed => -1,
            RadioStatus::NoAccessPoint => -2,
            RadioStatus::WrongPassword => -3,
        }
    }

    /// Whether association is still under way.
    pub fn is_in_progress(self) -> bool {
        (0..3).contains(&self.code())
    }
}

/// Errors reported by the radio.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio is not associated")]
    NotConnected,

    #[error("radio error: {0}")]
    Device(String),
}

/// A WiFi station interface.
///
/// Implementations must tolerate calls from several tasks at once: the
/// display task reads the signal strength while the orchestrator
/// connects or disconnects.
pub trait WifiRadio: Send + Sync {
    /// Power the interface up or down.
    fn set_active(&self, active: bool);

    /// Start associating with a network; progress is read via `status`.
    fn connect(&self, ssid: &str, password: &str);

    fn disconnect(&self);

    fn status(&self) -> RadioStatus;

    /// Station address, when one is assigned.
    fn ip(&self) -> Option<Ipv4Addr>;

    /// Received signal strength in dBm.
    fn rssi(&self) -> Result<i32, RadioError>;
}

/// Monochrome display colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    White,
}

/// Images the display can blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Wifi(IconState),
    Server(IconState),
}

/// A small framebuffer display.
pub trait Display: Send {
    fn fill(&mut self, color: Color);

    fn blit(&mut self, icon: Icon, x: i32, y: i32);

    fn text(&mut self, text: &str, x: i32, y: i32, color: Color);

    fn rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Color, filled: bool);

    /// Send a raw controller command byte.
    fn command(&mut self, byte: u8);

    /// Flush the framebuffer to the panel.
    fn show(&mut self);
}

/// A push button.
pub trait Button: Send {
    /// Whether the button is held down right now.
    fn is_pressed(&mut self) -> bool;
}

/// Errors from a wall-clock time source.
#[derive(Debug, Error)]
pub enum TimeSyncError {
    #[error("time sync I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid time server reply: {0}")]
    InvalidReply(String),
}

/// A source of the current UTC time (typically SNTP).
pub trait TimeSource: Send + Sync {
    /// Fetch the current time. May block up to the source's own timeout.
    fn fetch_utc(&self) -> Result<DateTime<Utc>, TimeSyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_status_progress() {
        assert!(RadioStatus::Idle.is_in_progress());
        assert!(RadioStatus::Connecting.is_in_progress());
        assert!(!RadioStatus::GotIp.is_in_progress());
        assert!(!RadioStatus::WrongPassword.is_in_progress());
        assert!(!RadioStatus::NoAccessPoint.is_in_progress());
        assert!(!RadioStatus::ConnectFailed.is_in_progress());
    }
}
