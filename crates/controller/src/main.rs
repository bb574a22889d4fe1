mod cloud;
mod config;
mod csvlog;
mod cycle;
mod error;
#[cfg(feature = "gpio")]
mod hw;
mod irrigation;
mod light;
mod moisture;
mod ports;
mod record;
mod shutdown;
#[cfg(all(feature = "sim", not(feature = "gpio")))]
mod sim;

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cloud::ThingSpeakClient;
use config::Config;
use csvlog::CsvLog;
use cycle::{ControlCycle, StopReason};

#[cfg(not(any(feature = "gpio", feature = "sim")))]
compile_error!("enable the `sim` feature (default) or `gpio` for real hardware");

/// Exit codes: 0 = clean stop (emergency button or operator interrupt),
/// 1 = configuration error, 2 = hardware fault.
const EXIT_CONFIG: u8 = 1;
const EXIT_HARDWARE: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let cfg = match config::load(Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(config = %config_path, "configuration loaded");

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn({
        let trigger = trigger.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received — beginning safe shutdown");
                trigger.trigger();
            }
        }
    });

    match run(cfg, shutdown).await {
        Ok(StopReason::EmergencyStop) => {
            info!("stopped by emergency button");
            ExitCode::SUCCESS
        }
        Ok(StopReason::Interrupted) => {
            info!("stopped by operator interrupt");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal hardware fault: {e:#}");
            ExitCode::from(EXIT_HARDWARE)
        }
    }
}

async fn run(cfg: Config, shutdown: shutdown::Shutdown) -> Result<StopReason> {
    let persistence = CsvLog::new(&cfg.persistence.csv_path);

    let cloud = cfg
        .cloud
        .as_ref()
        .map(ThingSpeakClient::new)
        .transpose()
        .context("cloud client init failed")?;
    if cloud.is_none() {
        info!("cloud uplink disabled");
    }

    #[cfg(feature = "gpio")]
    {
        let sensors = hw::GpioSensors::new(&cfg.hardware).context("sensor init failed")?;
        let actuators = hw::GpioActuators::new(&cfg.hardware).context("relay init failed")?;
        let cycle = ControlCycle::new(cfg, sensors, actuators, persistence, cloud, shutdown);
        return cycle.run().await.map_err(Into::into);
    }

    #[cfg(not(feature = "gpio"))]
    {
        info!("running against simulated peripherals");
        let cycle = ControlCycle::new(
            cfg,
            sim::SimSensors::new(),
            sim::SimActuators::default(),
            persistence,
            cloud,
            shutdown,
        );
        return cycle.run().await.map_err(Into::into);
    }
}
