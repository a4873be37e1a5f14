//! Environmental monitor data model types.
//!
//! These types describe what the device knows about the world:
//! - Per-sensor measurements
//! - WiFi connection status and its display projection
//! - HTTP listener bind status

use std::fmt;

/// Latest reading of one sensor.
///
/// A field is `None` when the sensor has never answered or its last
/// read failed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    /// Temperature in degrees Celsius
    pub temperature: Option<f32>,
    /// Relative humidity in percent
    pub humidity: Option<f32>,
}

impl Measurement {
    /// A measurement with both fields unknown.
    pub const UNKNOWN: Measurement = Measurement {
        temperature: None,
        humidity: None,
    };

    /// Create a measurement with both fields known.
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
        }
    }

    /// True when neither field is known.
    pub fn is_unknown(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }
}

/// WiFi connection status as tracked by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Radio inactive or no attempt made yet.
    #[default]
    Idle,
    /// Association in progress.
    Connecting,
    /// Access point rejected the credentials.
    WrongPassword,
    /// No access point with the configured SSID answered.
    NoAccessPoint,
    /// Association failed for any other reason.
    ConnectFailed,
    /// Associated and holding an IP address.
    Connected(String),
}

impl ConnectionStatus {
    /// Numeric status code, matching the radio's link status codes.
    pub fn code(&self) -> i32 {
        match self {
            ConnectionStatus::Idle => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected(_) => 3,
            ConnectionStatus::ConnectFailed => -1,
            ConnectionStatus::NoAccessPoint => -2,
            ConnectionStatus::WrongPassword => -3,
        }
    }

    /// Whether the status is still inside the "in progress" code range.
    pub fn is_in_progress(&self) -> bool {
        (0..3).contains(&self.code())
    }

    /// Whether the status is a terminal failure.
    pub fn is_failure(&self) -> bool {
        self.code() < 0
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected(_))
    }

    /// The IP address, only present when connected.
    pub fn ip(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Connected(ip) => Some(ip),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::WrongPassword => write!(f, "wrong password"),
            ConnectionStatus::NoAccessPoint => write!(f, "no access point found"),
            ConnectionStatus::ConnectFailed => write!(f, "connect failed"),
            ConnectionStatus::Connected(ip) => write!(f, "connected ({})", ip),
        }
    }
}

/// What the display shows about the network link.
///
/// The orchestrator derives this from the connection status once per
/// connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkView {
    /// No connect attempt has finished yet.
    #[default]
    NotAttempted,
    /// The last connect attempt failed.
    Error,
    /// Connected with the given dotted IP.
    Connected(String),
}

impl LinkView {
    /// Text shown on screen for this link state.
    pub fn label(&self) -> &str {
        match self {
            LinkView::NotAttempted => "0.0.0.0",
            LinkView::Error => "WiFi Error",
            LinkView::Connected(ip) => ip,
        }
    }
}

/// Bind status of the HTTP listener for the current connection epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BindStatus {
    #[default]
    Unknown = 0,
    Bound = 1,
    Failed = 2,
}

impl BindStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a stored value; anything unrecognised reads as `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => BindStatus::Bound,
            2 => BindStatus::Failed,
            _ => BindStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ConnectionStatus::Idle.code(), 0);
        assert_eq!(ConnectionStatus::Connecting.code(), 1);
        assert_eq!(ConnectionStatus::Connected("10.0.0.2".into()).code(), 3);
        assert_eq!(ConnectionStatus::WrongPassword.code(), -3);
        assert_eq!(ConnectionStatus::NoAccessPoint.code(), -2);
        assert_eq!(ConnectionStatus::ConnectFailed.code(), -1);
    }

    #[test]
    fn test_in_progress_range() {
        assert!(ConnectionStatus::Idle.is_in_progress());
        assert!(ConnectionStatus::Connecting.is_in_progress());
        assert!(!ConnectionStatus::Connected("1.2.3.4".into()).is_in_progress());
        assert!(!ConnectionStatus::WrongPassword.is_in_progress());
        assert!(ConnectionStatus::NoAccessPoint.is_failure());
    }

    #[test]
    fn test_ip_only_when_connected() {
        assert_eq!(ConnectionStatus::Idle.ip(), None);
        assert_eq!(ConnectionStatus::ConnectFailed.ip(), None);
        assert_eq!(
            ConnectionStatus::Connected("192.168.1.10".into()).ip(),
            Some("192.168.1.10")
        );
    }

    #[test]
    fn test_link_labels() {
        assert_eq!(LinkView::NotAttempted.label(), "0.0.0.0");
        assert_eq!(LinkView::Error.label(), "WiFi Error");
        assert_eq!(LinkView::Connected("10.1.2.3".into()).label(), "10.1.2.3");
    }

    #[test]
    fn test_bind_status_round_trip() {
        for status in [BindStatus::Unknown, BindStatus::Bound, BindStatus::Failed] {
            assert_eq!(BindStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(BindStatus::from_u8(42), BindStatus::Unknown);
    }
}
