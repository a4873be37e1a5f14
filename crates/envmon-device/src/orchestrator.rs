//! Device lifecycle.
//!
//! The orchestrator owns the sensors, the connection manager and the
//! response server. It starts the display task, then loops:
//! connect, sync the clock once, bind once per connection epoch, and serve
//! one request per fresh sample until the link drops or shutdown is
//! requested.

use std::sync::Arc;
use std::time::Duration;

use envmon_core::config::DeviceConfig;
use envmon_core::{BindStatus, LinkView, SharedState};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::display::{DisplaySettings, DisplayTask, Panel};
use crate::hal::{TimeSource, WifiRadio};
use crate::sensors::SensorArray;
use crate::server::ResponseServer;
use crate::wifi::{ConnectionManager, RetryPolicy};

/// The hardware a device runs on.
pub struct Device {
    pub sensors: SensorArray,
    pub radio: Arc<dyn WifiRadio>,
    /// Display and buttons; headless when absent.
    pub panel: Option<Panel>,
    /// Wall-clock source; the clock and uptime stay blank when absent.
    pub clock: Option<Arc<dyn TimeSource>>,
}

/// Why [`Orchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// An exit was requested.
    ShutdownRequested,
    /// The listener could not be bound.
    BindFailed,
}

pub struct Orchestrator {
    config: DeviceConfig,
    state: Arc<SharedState>,
    wifi: Arc<ConnectionManager>,
    server: ResponseServer,
    sensors: SensorArray,
    panel: Option<Panel>,
    clock: Option<Arc<dyn TimeSource>>,
    clock_attempted: bool,
}

impl Orchestrator {
    pub fn new(config: DeviceConfig, device: Device) -> Self {
        let state = Arc::new(SharedState::new(device.sensors.len()));
        let wifi = Arc::new(ConnectionManager::new(
            device.radio,
            config.wifi.ssid.as_str(),
            config.wifi.password.as_str(),
            RetryPolicy::from(&config.timing),
        ));
        let server = ResponseServer::new(config.timing.accept_timeout());
        let panel = device.panel.filter(|_| config.display.enabled);
        let clock = device.clock.filter(|_| config.clock.enabled);

        Self {
            config,
            state,
            wifi,
            server,
            sensors: device.sensors,
            panel,
            clock,
            clock_attempted: false,
        }
    }

    /// State shared with the display; also the handle for requesting exit.
    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    /// Run until an exit is requested or the listener cannot be bound.
    pub async fn run(mut self) -> RunOutcome {
        info!(sensors = self.sensors.len(), "device starting");
        self.sample();

        let display = self.spawn_display();
        let timing = self.config.timing.clone();
        pause(&self.state, timing.tick(), timing.startup_delay()).await;

        let outcome = self.serve_loop().await;

        info!(?outcome, "device stopping");
        self.state.shutdown().request_exit();
        self.state.shutdown().request_stop();
        if let Some(handle) = display {
            wait_for_display(handle, timing.shutdown_grace()).await;
        }
        self.wifi.disconnect();
        self.server.close();
        info!("device stopped");
        outcome
    }

    async fn serve_loop(&mut self) -> RunOutcome {
        let port = self.config.server.port;
        let tick = self.config.timing.tick();
        let retry_interval = self.config.timing.retry_interval();

        while !self.state.shutdown().exit_requested() {
            if !self.wifi.is_connected() {
                self.start_epoch().await;
            }

            if let Some(ip) = self.wifi.ip() {
                self.sync_clock().await;

                if !self.server.is_bound() {
                    match self.server.bind(&ip, port) {
                        Ok(addr) => {
                            info!(%addr, "serving readings");
                            self.state.set_bind(BindStatus::Bound);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to bind HTTP server");
                            self.state.set_bind(BindStatus::Failed);
                            return RunOutcome::BindFailed;
                        }
                    }
                }

                while self.server.is_bound()
                    && self.wifi.is_connected()
                    && !self.state.shutdown().is_requested()
                {
                    let values = self.state.temperatures();
                    self.server.serve_once(&values, &ip).await;
                    self.sample();
                }

                if !self.wifi.is_connected() {
                    self.end_epoch();
                }
            }

            pause(&self.state, tick, retry_interval).await;
        }

        RunOutcome::ShutdownRequested
    }

    /// Forget the previous link and connect again.
    async fn start_epoch(&mut self) {
        self.end_epoch();

        match self.wifi.connect().await {
            Ok(ip) => self.state.set_link(LinkView::Connected(ip)),
            Err(e) => {
                warn!(error = %e, "WiFi unavailable, retrying later");
                self.state.set_link(LinkView::Error);
            }
        }
    }

    /// Drop the listener of a lost link.
    fn end_epoch(&mut self) {
        if self.server.is_bound() {
            info!("closing listener of the previous link");
        }
        self.state.set_bind(BindStatus::Unknown);
        self.server.close();
    }

    fn sample(&mut self) {
        let measurements = self.sensors.sample_all();
        self.state.publish_all(&measurements);
    }

    fn spawn_display(&mut self) -> Option<JoinHandle<()>> {
        let panel = self.panel.take()?;
        let settings = DisplaySettings::from_config(&self.config);
        Some(DisplayTask::new(panel, self.state.clone(), self.wifi.clone(), settings).spawn())
    }

    /// One time sync per run, after the first connect. Failures are only logged.
    async fn sync_clock(&mut self) {
        if self.clock_attempted {
            return;
        }
        self.clock_attempted = true;
        let Some(clock) = self.clock.clone() else {
            return;
        };

        match tokio::task::spawn_blocking(move || clock.fetch_utc()).await {
            Ok(Ok(utc)) => {
                if self.state.record_time_sync(utc) {
                    info!(%utc, "clock synchronized");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "time sync failed"),
            Err(e) => warn!(error = %e, "time sync task failed"),
        }
    }
}

/// Sleep for `duration` in `slice`-sized steps, returning early on exit.
async fn pause(state: &SharedState, slice: Duration, duration: Duration) {
    let deadline = Instant::now() + duration;

    while !state.shutdown().exit_requested() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(slice.min(deadline - now)).await;
    }
}

async fn wait_for_display(handle: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => debug!("display parked"),
        Ok(Err(e)) => warn!(error = %e, "display task failed"),
        Err(_) => warn!(?grace, "display task did not park in time"),
    }
}
