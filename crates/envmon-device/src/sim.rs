//! Host implementations of the device capabilities.
//!
//! These let the full device run on a Linux machine: sensors read fixed
//! values or sysfs/text files, the radio emulates association, the display
//! writes its frames to the log and the buttons are never pressed.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use envmon_core::config::{RadioConfig, SensorSpec};
use envmon_core::Measurement;
use tracing::{debug, trace};

use crate::hal::{
    Button, Color, Display, Icon, RadioError, RadioStatus, SensorDriver, SensorError, WifiRadio,
};

/// Always reports the same values. With neither value set it never answers.
#[derive(Debug, Clone)]
pub struct FixedSensor {
    reading: Measurement,
}

impl FixedSensor {
    pub fn new(temperature: Option<f32>, humidity: Option<f32>) -> Self {
        Self {
            reading: Measurement {
                temperature,
                humidity,
            },
        }
    }
}

impl SensorDriver for FixedSensor {
    fn read(&mut self) -> Result<Measurement, SensorError> {
        if self.reading.is_unknown() {
            return Err(SensorError::NoResponse);
        }
        Ok(self.reading)
    }
}

/// Linux thermal zone: one integer in millidegrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZoneSensor {
    path: PathBuf,
}

impl ThermalZoneSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SensorDriver for ThermalZoneSensor {
    fn read(&mut self) -> Result<Measurement, SensorError> {
        let raw = fs::read_to_string(&self.path)?;
        let millidegrees: i64 = raw
            .trim()
            .parse()
            .map_err(|_| SensorError::InvalidData(raw.trim().to_string()))?;
        Ok(Measurement {
            temperature: Some(millidegrees as f32 / 1000.0),
            humidity: None,
        })
    }
}

/// Text file holding `temperature [humidity]`, whitespace separated.
#[derive(Debug, Clone)]
pub struct FileSensor {
    path: PathBuf,
}

impl FileSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn parse_value(field: &str) -> Result<f32, SensorError> {
    field
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SensorError::InvalidData(field.to_string()))
}

impl SensorDriver for FileSensor {
    fn read(&mut self) -> Result<Measurement, SensorError> {
        let raw = fs::read_to_string(&self.path)?;
        let mut fields = raw.split_whitespace();

        let temperature = match fields.next() {
            Some(field) => parse_value(field)?,
            None => return Err(SensorError::InvalidData("empty file".into())),
        };
        let humidity = fields.next().map(parse_value).transpose()?;

        Ok(Measurement {
            temperature: Some(temperature),
            humidity,
        })
    }
}

/// Never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultySensor;

impl SensorDriver for FaultySensor {
    fn read(&mut self) -> Result<Measurement, SensorError> {
        Err(SensorError::NoResponse)
    }
}

/// Build the driver for one configured sensor.
pub fn sensor_from_spec(spec: &SensorSpec) -> Box<dyn SensorDriver> {
    match spec {
        SensorSpec::Fixed {
            temperature,
            humidity,
        } => Box::new(FixedSensor::new(*temperature, *humidity)),
        SensorSpec::ThermalZone { path } => Box::new(ThermalZoneSensor::new(path.clone())),
        SensorSpec::File { path } => Box::new(FileSensor::new(path.clone())),
        SensorSpec::Faulty => Box::new(FaultySensor),
    }
}

/// Short name used in logs.
pub fn sensor_name(spec: &SensorSpec) -> &'static str {
    match spec {
        SensorSpec::Fixed { .. } => "fixed",
        SensorSpec::ThermalZone { .. } => "thermal_zone",
        SensorSpec::File { .. } => "file",
        SensorSpec::Faulty => "faulty",
    }
}

#[derive(Debug)]
struct RadioState {
    active: bool,
    status: RadioStatus,
    polls: u32,
}

/// Emulated station interface.
///
/// Associates after `polls_to_associate` status polls, then reports the
/// configured address and signal strength. An empty SSID finds no access
/// point.
#[derive(Debug)]
pub struct HostRadio {
    config: RadioConfig,
    state: Mutex<RadioState>,
}

impl HostRadio {
    pub fn new(config: RadioConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RadioState {
                active: false,
                status: RadioStatus::Idle,
                polls: 0,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RadioState) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl WifiRadio for HostRadio {
    fn set_active(&self, active: bool) {
        self.with_state(|state| {
            state.active = active;
            if !active {
                state.status = RadioStatus::Idle;
            }
        });
        debug!(active, "radio power");
    }

    fn connect(&self, ssid: &str, _password: &str) {
        self.with_state(|state| {
            state.polls = 0;
            state.status = if !state.active {
                RadioStatus::ConnectFailed
            } else if ssid.is_empty() {
                RadioStatus::NoAccessPoint
            } else {
                RadioStatus::Connecting
            };
        });
    }

    fn disconnect(&self) {
        self.with_state(|state| state.status = RadioStatus::Idle);
    }

    fn status(&self) -> RadioStatus {
        let polls_to_associate = self.config.polls_to_associate;
        self.with_state(|state| {
            if state.status == RadioStatus::Connecting {
                if state.polls >= polls_to_associate {
                    state.status = RadioStatus::GotIp;
                }
                state.polls += 1;
            }
            state.status
        })
    }

    fn ip(&self) -> Option<std::net::Ipv4Addr> {
        let connected = self.with_state(|state| state.status == RadioStatus::GotIp);
        connected.then_some(self.config.address)
    }

    fn rssi(&self) -> Result<i32, RadioError> {
        let connected = self.with_state(|state| state.status == RadioStatus::GotIp);
        if connected {
            Ok(self.config.rssi)
        } else {
            Err(RadioError::NotConnected)
        }
    }
}

/// Display that logs each flushed frame.
#[derive(Debug, Default)]
pub struct TraceDisplay {
    frame: Vec<String>,
}

impl TraceDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for TraceDisplay {
    fn fill(&mut self, _color: Color) {
        self.frame.clear();
    }

    fn blit(&mut self, icon: Icon, _x: i32, _y: i32) {
        let label = match icon {
            Icon::Wifi(state) => format!("wifi[{}]", state.index()),
            Icon::Server(state) => format!("server[{}]", state.index()),
        };
        self.frame.push(label);
    }

    fn text(&mut self, text: &str, _x: i32, _y: i32, _color: Color) {
        if !text.is_empty() {
            self.frame.push(text.to_string());
        }
    }

    fn rect(&mut self, _x: i32, _y: i32, _width: u32, _height: u32, _color: Color, _filled: bool) {}

    fn command(&mut self, byte: u8) {
        debug!(command = format_args!("{:#04x}", byte), "display command");
    }

    fn show(&mut self) {
        trace!(frame = %self.frame.join(" | "), "display frame");
    }
}

/// A button nobody presses.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleButton;

impl Button for IdleButton {
    fn is_pressed(&mut self) -> bool {
        false
    }
}
