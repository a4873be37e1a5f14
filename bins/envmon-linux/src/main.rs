use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use envmon_core::{ConfigError, DeviceConfig};
use envmon_device::hal::TimeSource;
use envmon_device::sim::{sensor_from_spec, sensor_name, HostRadio, IdleButton, TraceDisplay};
use envmon_device::{Device, Orchestrator, Panel, RunOutcome, SensorArray, SntpClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "config/envmon.toml";

/// `ENOENT`, reported when no configuration can be loaded.
const EXIT_NO_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = match DeviceConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let ConfigError::Parse(_) | ConfigError::Invalid(_) = e {
                eprintln!("Check {} against config/envmon.toml", path.display());
            }
            return ExitCode::from(EXIT_NO_CONFIG);
        }
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(config).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "envmon exited");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: DeviceConfig) -> anyhow::Result<RunOutcome> {
    tracing::info!(
        ssid = %config.wifi.ssid,
        port = config.server.port,
        sensors = config.sensors.len(),
        "envmon starting"
    );

    let mut sensors = SensorArray::new();
    for (index, spec) in config.sensors.iter().enumerate() {
        sensors.push(format!("{}-{}", sensor_name(spec), index), sensor_from_spec(spec));
    }

    let clock = config.clock.enabled.then(|| {
        Arc::new(SntpClient::new(
            config.clock.ntp_server.as_str(),
            config.timing.ntp_timeout(),
        )) as Arc<dyn TimeSource>
    });

    let device = Device {
        sensors,
        radio: Arc::new(HostRadio::new(config.radio.clone())),
        panel: Some(Panel {
            display: Box::new(TraceDisplay::new()),
            button_a: Box::new(IdleButton),
            button_b: Box::new(IdleButton),
        }),
        clock,
    };

    let orchestrator = Orchestrator::new(config, device);
    let state = orchestrator.state();

    // Ctrl+C acts as the exit button
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down...");
            state.shutdown().request_exit();
        }
    });

    let outcome = tokio::spawn(orchestrator.run())
        .await
        .context("device task panicked")?;
    Ok(outcome)
}
