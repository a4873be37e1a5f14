//! WiFi connection management.
//!
//! [`ConnectionManager`] runs the connect/retry protocol on top of a
//! [`WifiRadio`]:
//! 1. Activates the radio
//! 2. Issues a connect request and polls the link status
//! 3. On failure disconnects, pauses and tries another round
//!
//! The status lock is only held for single reads and writes, never across
//! a sleep, so the display task can query signal strength at any time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use envmon_core::config::TimingConfig;
use envmon_core::ConnectionStatus;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hal::{RadioStatus, WifiRadio};

/// Why a connect call gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WifiError {
    #[error("no WiFi SSID configured")]
    MissingCredentials,

    #[error("access point rejected the password")]
    WrongPassword,

    #[error("no access point found for the SSID")]
    NoAccessPoint,

    #[error("connection failed")]
    ConnectFailed,

    /// The last round was still associating when its poll budget ran out.
    #[error("timed out while associating")]
    Timeout,
}

/// Retry parameters of [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub rounds: u32,
    pub poll_interval: Duration,
    pub poll_limit: u32,
    pub round_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rounds: 3,
            poll_interval: Duration::from_secs(1),
            poll_limit: 30,
            round_pause: Duration::from_secs(1),
        }
    }
}

impl From<&TimingConfig> for RetryPolicy {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            rounds: timing.wifi_rounds,
            poll_interval: timing.wifi_poll(),
            poll_limit: timing.wifi_poll_limit,
            round_pause: timing.wifi_round_pause(),
        }
    }
}

/// Owns the WiFi state machine.
pub struct ConnectionManager {
    radio: Arc<dyn WifiRadio>,
    ssid: String,
    password: String,
    policy: RetryPolicy,
    status: Mutex<ConnectionStatus>,
}

impl ConnectionManager {
    pub fn new(
        radio: Arc<dyn WifiRadio>,
        ssid: impl Into<String>,
        password: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            radio,
            ssid: ssid.into(),
            password: password.into(),
            policy,
            status: Mutex::new(ConnectionStatus::Idle),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Current status as last recorded.
    pub fn status(&self) -> ConnectionStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect, retrying up to the policy's round count.
    ///
    /// Returns the station IP. Returns immediately when already connected.
    /// On failure the manager keeps the last link status and the error
    /// tells which kind of failure ended the last round.
    pub async fn connect(&self) -> Result<String, WifiError> {
        if let ConnectionStatus::Connected(ip) = self.status() {
            return Ok(ip);
        }
        if self.ssid.is_empty() {
            return Err(WifiError::MissingCredentials);
        }

        self.radio.set_active(true);
        let mut last = RadioStatus::Idle;

        for round in 1..=self.policy.rounds {
            info!(ssid = %self.ssid, round, "connecting to WiFi");
            self.set_status(ConnectionStatus::Connecting);
            self.radio.connect(&self.ssid, &self.password);

            last = self.poll_round().await;

            if last == RadioStatus::GotIp {
                if let Some(ip) = self.radio.ip() {
                    let ip = ip.to_string();
                    info!(%ip, round, "WiFi connected");
                    self.set_status(ConnectionStatus::Connected(ip.clone()));
                    return Ok(ip);
                }
                warn!(round, "radio reported an IP but none is assigned");
                last = RadioStatus::ConnectFailed;
            }

            warn!(round, status = last.code(), "WiFi connect round failed");
            self.radio.disconnect();
            if round < self.policy.rounds {
                tokio::time::sleep(self.policy.round_pause).await;
            }
        }

        let (status, error) = match last {
            RadioStatus::WrongPassword => (ConnectionStatus::WrongPassword, WifiError::WrongPassword),
            RadioStatus::NoAccessPoint => (ConnectionStatus::NoAccessPoint, WifiError::NoAccessPoint),
            RadioStatus::ConnectFailed | RadioStatus::GotIp => {
                (ConnectionStatus::ConnectFailed, WifiError::ConnectFailed)
            }
            RadioStatus::Idle => (ConnectionStatus::Idle, WifiError::Timeout),
            RadioStatus::Connecting => (ConnectionStatus::Connecting, WifiError::Timeout),
        };
        self.set_status(status);
        Err(error)
    }

    /// Poll the link status until it leaves the in-progress range or the
    /// poll budget is spent.
    async fn poll_round(&self) -> RadioStatus {
        let mut status = RadioStatus::Connecting;
        for _ in 0..self.policy.poll_limit {
            status = self.radio.status();
            if !status.is_in_progress() {
                break;
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
        status
    }

    /// Whether the link is up.
    ///
    /// A connected manager whose radio lost its address falls back to
    /// `Idle`, ending the connection epoch.
    pub fn is_connected(&self) -> bool {
        if !self.status().is_connected() {
            return false;
        }
        if self.radio.status() == RadioStatus::GotIp {
            return true;
        }
        warn!("WiFi link lost");
        self.set_status(ConnectionStatus::Idle);
        false
    }

    /// Station IP, only while connected.
    pub fn ip(&self) -> Option<String> {
        self.status().ip().map(str::to_string)
    }

    /// RSSI in dBm while connected; `None` otherwise or on a read error.
    pub fn signal_strength(&self) -> Option<i32> {
        if !self.status().is_connected() {
            return None;
        }
        match self.radio.rssi() {
            Ok(rssi) => Some(rssi),
            Err(e) => {
                debug!(error = %e, "RSSI read failed");
                None
            }
        }
    }

    /// Drop the association and power the radio down.
    pub fn disconnect(&self) {
        self.radio.disconnect();
        self.radio.set_active(false);
        self.set_status(ConnectionStatus::Idle);
        info!("WiFi disconnected");
    }
}
