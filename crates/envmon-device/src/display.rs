//! Status display task.
//!
//! Runs passes of `total_ticks` ticks. Every tick it polls the two buttons,
//! recomputes what changed on its own cadence and redraws the screen:
//!
//! ```text
//! [wifi][srv]        12:34
//! -------------------------
//! Sensor 1
//! T: 22.0C
//! H: 55.0%
//! 192.168.1.10    0:01:23
//! ```
//!
//! Button A toggles the screen, button B asks the whole device to exit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use envmon_core::config::DeviceConfig;
use envmon_core::schedule::{self, AUTO_OFF_TICKS};
use envmon_core::signal::{self, IconState};
use envmon_core::SharedState;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::hal::{Button, Color, Display, Icon};
use crate::wifi::ConnectionManager;

/// Controller commands that bring the panel out of sleep.
pub const POWER_ON_SEQUENCE: [u8; 3] = [0xAD, 0x8B, 0xAF];

/// Controller command that puts the panel to sleep.
pub const POWER_OFF: u8 = 0xAE;

/// Shown while the clock has never been synced.
const NO_CLOCK: &str = "--:--";

/// The display and its two buttons.
pub struct Panel {
    pub display: Box<dyn Display>,
    /// Screen on/off toggle.
    pub button_a: Box<dyn Button>,
    /// Exit.
    pub button_b: Box<dyn Button>,
}

/// Timing of the display loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub tick: Duration,
    pub debounce: Duration,
    pub total_ticks: usize,
    pub utc_offset: FixedOffset,
}

impl DisplaySettings {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            tick: config.timing.tick(),
            debounce: config.timing.debounce(),
            total_ticks: config.timing.total_ticks.max(1),
            utc_offset: config.clock.utc_offset(),
        }
    }
}

/// Strings and icons currently on screen.
#[derive(Debug, Clone, PartialEq)]
struct View {
    wifi: IconState,
    server: IconState,
    sensor: Option<usize>,
    temperature: String,
    humidity: String,
    link: String,
    clock: Option<DateTime<FixedOffset>>,
    clock_text: String,
    uptime_text: String,
}

impl Default for View {
    fn default() -> Self {
        Self {
            wifi: IconState::Frame(0),
            server: IconState::Error,
            sensor: None,
            temperature: format_reading(None, "C"),
            humidity: format_reading(None, "%"),
            link: String::new(),
            clock: None,
            clock_text: NO_CLOCK.to_string(),
            uptime_text: String::new(),
        }
    }
}

pub struct DisplayTask {
    panel: Panel,
    state: Arc<SharedState>,
    wifi: Arc<ConnectionManager>,
    settings: DisplaySettings,
    screen_on: bool,
    on_ticks: usize,
    view: View,
}

impl DisplayTask {
    pub fn new(
        panel: Panel,
        state: Arc<SharedState>,
        wifi: Arc<ConnectionManager>,
        settings: DisplaySettings,
    ) -> Self {
        Self {
            panel,
            state,
            wifi,
            settings,
            screen_on: true,
            on_ticks: 0,
            view: View::default(),
        }
    }

    /// Run the task on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until a shutdown flag is seen, then park the panel.
    pub async fn run(mut self) {
        info!(total_ticks = self.settings.total_ticks, "display task started");
        self.power_on();

        'passes: loop {
            for tick in 0..self.settings.total_ticks {
                let shutdown = self.state.shutdown();
                if shutdown.is_requested() {
                    shutdown.request_exit();
                    break 'passes;
                }

                if self.panel.button_a.is_pressed() {
                    self.toggle_screen().await;
                }
                if self.panel.button_b.is_pressed() {
                    info!("exit button pressed");
                    self.state.shutdown().request_exit();
                    break;
                }

                if self.screen_on {
                    self.on_ticks += 1;
                    self.update(tick);
                    self.render();
                }

                tokio::time::sleep(self.settings.tick).await;
            }

            if self.screen_on && self.on_ticks >= AUTO_OFF_TICKS {
                debug!(on_ticks = self.on_ticks, "screen auto-off");
                self.power_off();
            }
        }

        self.park();
        info!("display task stopped");
    }

    async fn toggle_screen(&mut self) {
        if self.screen_on {
            self.power_off();
        } else {
            self.power_on();
        }
        tokio::time::sleep(self.settings.debounce).await;
    }

    fn power_on(&mut self) {
        for byte in POWER_ON_SEQUENCE {
            self.panel.display.command(byte);
        }
        self.screen_on = true;
        self.on_ticks = 0;
        debug!("screen on");
    }

    fn power_off(&mut self) {
        self.panel.display.fill(Color::Black);
        self.panel.display.command(POWER_OFF);
        self.screen_on = false;
        self.on_ticks = 0;
        debug!("screen off");
    }

    fn park(&mut self) {
        self.panel.display.fill(Color::Black);
        self.panel.display.show();
        self.panel.display.command(POWER_OFF);
        self.screen_on = false;
    }

    /// Recompute the fields due at `tick`.
    fn update(&mut self, tick: usize) {
        let link = self.state.link();
        let rssi = self.wifi.signal_strength();
        self.view.wifi = signal::wifi_icon(&link, rssi, tick);
        self.view.server = signal::server_icon(self.state.bind(), tick);
        self.view.link = link.label().to_string();

        let sensor = schedule::active_sensor(tick, self.settings.total_ticks, self.state.sensor_count());
        let measurement = sensor
            .and_then(|index| self.state.measurement(index))
            .unwrap_or_default();
        self.view.sensor = sensor;
        self.view.temperature = format_reading(measurement.temperature, "C");
        self.view.humidity = format_reading(measurement.humidity, "%");

        let sync = self.state.time_sync();
        if schedule::refresh_clock(tick) {
            self.view.clock = sync.map(|s| s.now_utc().with_timezone(&self.settings.utc_offset));
        }
        if schedule::reformat_clock(tick) {
            self.view.clock_text =
                format_clock(self.view.clock, schedule::clock_separator_visible(tick));
        }
        if schedule::refresh_uptime(tick) {
            if let Some(sync) = sync {
                self.view.uptime_text = format_uptime(sync.uptime());
            }
        }
        trace!(tick, view = ?self.view, "display updated");
    }

    fn render(&mut self) {
        let view = &self.view;
        let display = &mut self.panel.display;

        display.fill(Color::Black);
        display.blit(Icon::Wifi(view.wifi), 0, 0);
        display.blit(Icon::Server(view.server), 16, 0);
        display.text(&view.clock_text, 88, 0, Color::White);
        display.rect(0, 12, 128, 1, Color::White, true);

        let label = match view.sensor {
            Some(index) => format!("Sensor {}", index + 1),
            None => "No sensor".to_string(),
        };
        display.text(&label, 0, 16, Color::White);
        display.text(&view.temperature, 0, 28, Color::White);
        display.text(&view.humidity, 0, 40, Color::White);
        display.text(&view.link, 0, 54, Color::White);
        display.text(&view.uptime_text, 72, 54, Color::White);
        display.show();
    }
}

/// `T: 22.0C` style reading, or `??` when unknown.
fn format_reading(value: Option<f32>, unit: &str) -> String {
    let prefix = if unit == "%" { "H" } else { "T" };
    match value {
        Some(v) => format!("{}: {:.1}{}", prefix, v, unit),
        None => format!("{}: ??", prefix),
    }
}

fn format_clock(time: Option<DateTime<FixedOffset>>, separator_visible: bool) -> String {
    match time {
        Some(time) if separator_visible => time.format("%H:%M").to_string(),
        Some(time) => time.format("%H %M").to_string(),
        None => NO_CLOCK.to_string(),
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, (secs / 3_600) % 24, (secs / 60) % 60, secs % 60);
    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    }
}
