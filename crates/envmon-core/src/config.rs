//! Device configuration.
//!
//! Configuration is read once at startup from a TOML file. Every section
//! has defaults, so a file only needs the WiFi credentials and the sensor
//! list:
//!
//! ```toml
//! [wifi]
//! ssid = "home"
//! password = "secret"
//!
//! [[sensors]]
//! kind = "thermal_zone"
//! path = "/sys/class/thermal/thermal_zone0/temp"
//! ```

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parse but make no sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub wifi: WifiConfig,
    pub server: ServerConfig,
    pub display: DisplayConfig,
    pub clock: ClockConfig,
    pub timing: TimingConfig,
    pub radio: RadioConfig,
    pub sensors: Vec<SensorSpec>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the reading endpoint listens on.
    pub port: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 80 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Run the display task at all.
    pub enabled: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Attempt a time sync after the first connect.
    pub enabled: bool,
    /// SNTP server host name.
    pub ntp_server: String,
    /// Fixed offset from UTC applied to the on-screen clock.
    pub utc_offset_minutes: i32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ntp_server: "pool.ntp.org".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

impl ClockConfig {
    /// Offset applied to the on-screen clock; UTC if out of range.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

/// Every delay and count used by the device tasks.
///
/// Durations are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Display tick period.
    pub tick_ms: u64,
    /// Ticks per display pass.
    pub total_ticks: usize,
    /// Sleep after a screen toggle press.
    pub debounce_ms: u64,
    /// Delay between starting the display and the first connect.
    pub startup_delay_ms: u64,
    /// Delay between outer connect/serve iterations.
    pub retry_interval_ms: u64,
    /// Maximum wait for an incoming HTTP connection.
    pub accept_timeout_ms: u64,
    /// WiFi status poll period.
    pub wifi_poll_ms: u64,
    /// Status polls per connect round.
    pub wifi_poll_limit: u32,
    /// Connect rounds per connect call.
    pub wifi_rounds: u32,
    /// Pause after a failed connect round.
    pub wifi_round_pause_ms: u64,
    /// Time the display task gets to park before WiFi is shut down.
    pub shutdown_grace_ms: u64,
    /// Read timeout of the SNTP request.
    pub ntp_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            total_ticks: crate::schedule::TOTAL_TICKS,
            debounce_ms: 500,
            startup_delay_ms: 1_000,
            retry_interval_ms: 30_000,
            accept_timeout_ms: 30_000,
            wifi_poll_ms: 1_000,
            wifi_poll_limit: 30,
            wifi_rounds: 3,
            wifi_round_pause_ms: 1_000,
            shutdown_grace_ms: 1_000,
            ntp_timeout_ms: 5_000,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn wifi_poll(&self) -> Duration {
        Duration::from_millis(self.wifi_poll_ms)
    }

    pub fn wifi_round_pause(&self) -> Duration {
        Duration::from_millis(self.wifi_round_pause_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn ntp_timeout(&self) -> Duration {
        Duration::from_millis(self.ntp_timeout_ms)
    }
}

/// Behaviour of the emulated radio used on a host build.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Address reported once associated.
    pub address: Ipv4Addr,
    /// Signal strength reported once associated (dBm).
    pub rssi: i32,
    /// Status polls before association completes.
    pub polls_to_associate: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::LOCALHOST,
            rssi: -55,
            polls_to_associate: 2,
        }
    }
}

/// One configured sensor, in display and HTTP index order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSpec {
    /// Constant reading; a sensor with neither value always fails.
    Fixed {
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        humidity: Option<f32>,
    },
    /// Linux thermal zone file holding millidegrees Celsius.
    ThermalZone { path: PathBuf },
    /// Text file holding `temperature [humidity]`.
    File { path: PathBuf },
    /// Never answers.
    Faulty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Load and validate configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would stall or break the device tasks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timing = &self.timing;
        if timing.tick_ms == 0 {
            return Err(ConfigError::Invalid("timing.tick_ms must be positive".into()));
        }
        if timing.total_ticks == 0 {
            return Err(ConfigError::Invalid("timing.total_ticks must be positive".into()));
        }
        if timing.wifi_rounds == 0 || timing.wifi_poll_limit == 0 {
            return Err(ConfigError::Invalid(
                "timing.wifi_rounds and timing.wifi_poll_limit must be positive".into(),
            ));
        }
        if self.sensors.is_empty() {
            return Err(ConfigError::Invalid("at least one sensor must be configured".into()));
        }
        if self.clock.utc_offset_minutes.unsigned_abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(
                "clock.utc_offset_minutes must be less than a day".into(),
            ));
        }
        if !crate::http::is_valid_port(self.server.port) {
            return Err(ConfigError::Invalid(format!(
                "server.port {} is out of range",
                self.server.port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = DeviceConfig::from_toml(
            r#"
            [wifi]
            ssid = "home"
            password = "secret"

            [[sensors]]
            kind = "faulty"
            "#,
        )
        .unwrap();

        assert_eq!(config.wifi.ssid, "home");
        assert_eq!(config.server.port, 80);
        assert!(config.display.enabled);
        assert_eq!(config.timing.total_ticks, 300);
        assert_eq!(config.timing.wifi_rounds, 3);
        assert_eq!(config.timing.wifi_poll_limit, 30);
        assert_eq!(config.timing.accept_timeout(), Duration::from_secs(30));
        assert_eq!(config.clock.ntp_server, "pool.ntp.org");
        assert_eq!(config.sensors, vec![SensorSpec::Faulty]);
    }

    #[test]
    fn test_sensor_kinds() {
        let config = DeviceConfig::from_toml(
            r#"
            [[sensors]]
            kind = "fixed"
            temperature = 22.0
            humidity = 55.0

            [[sensors]]
            kind = "fixed"

            [[sensors]]
            kind = "thermal_zone"
            path = "/sys/class/thermal/thermal_zone0/temp"

            [[sensors]]
            kind = "file"
            path = "/tmp/reading"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.sensors,
            vec![
                SensorSpec::Fixed {
                    temperature: Some(22.0),
                    humidity: Some(55.0)
                },
                SensorSpec::Fixed {
                    temperature: None,
                    humidity: None
                },
                SensorSpec::ThermalZone {
                    path: "/sys/class/thermal/thermal_zone0/temp".into()
                },
                SensorSpec::File {
                    path: "/tmp/reading".into()
                },
            ]
        );
    }

    #[test]
    fn test_timing_and_radio_overrides() {
        let config = DeviceConfig::from_toml(
            r#"
            [timing]
            tick_ms = 10
            wifi_rounds = 1

            [radio]
            address = "10.0.0.7"
            rssi = -70

            [[sensors]]
            kind = "faulty"
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.tick(), Duration::from_millis(10));
        assert_eq!(config.timing.wifi_rounds, 1);
        assert_eq!(config.timing.debounce_ms, 500);
        assert_eq!(config.radio.address, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(config.radio.rssi, -70);
        assert_eq!(config.clock.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_validation_errors() {
        let no_sensors = DeviceConfig::from_toml("[wifi]\nssid = \"x\"\n");
        assert!(matches!(no_sensors, Err(ConfigError::Invalid(_))));

        let zero_tick = DeviceConfig::from_toml(
            "[timing]\ntick_ms = 0\n[[sensors]]\nkind = \"faulty\"\n",
        );
        assert!(matches!(zero_tick, Err(ConfigError::Invalid(_))));

        let bad_port = DeviceConfig::from_toml(
            "[server]\nport = 70000\n[[sensors]]\nkind = \"faulty\"\n",
        );
        assert!(matches!(bad_port, Err(ConfigError::Invalid(_))));

        let bad_offset = DeviceConfig::from_toml(
            "[clock]\nutc_offset_minutes = 1440\n[[sensors]]\nkind = \"faulty\"\n",
        );
        assert!(matches!(bad_offset, Err(ConfigError::Invalid(_))));

        let min_offset = DeviceConfig::from_toml(
            "[clock]\nutc_offset_minutes = -2147483648\n[[sensors]]\nkind = \"faulty\"\n",
        );
        assert!(matches!(min_offset, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = DeviceConfig::from_toml(include_str!("../../../config/envmon.toml")).unwrap();
        assert_eq!(config.sensors.len(), 3);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.clock.utc_offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_parse_error() {
        let result = DeviceConfig::from_toml("[[sensors]]\nkind = \"laser\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = DeviceConfig::load("/nonexistent/envmon.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
