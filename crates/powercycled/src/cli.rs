//! Command-line interface.
//!
//! Flags override `powercycle.toml`; each override also reads the
//! environment variable deployments already use.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use powercycle_core::PowerCycleConfig;

/// Modbus-TCP port assumed when the sensor address has none.
const MODBUS_PORT: u16 = 502;

#[derive(Debug, Parser)]
#[command(name = "powercycled", about = "Power-constrained device cycling daemon")]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler loop and the HTTP API.
    Run {
        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Data directory for the device ledger.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Dashboard / metrics port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate the configuration and print the effective values.
    CheckConfig {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Path to powercycle.toml. Defaults apply when omitted.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Time between scheduling passes ("10s", "500ms", or bare seconds).
    #[arg(long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<String>,

    /// Power draw of one device, in kW.
    #[arg(long, env = "ASIC_POWER")]
    pub unit_power_kw: Option<f64>,

    /// Grid frequency below which devices may not run (Hz).
    #[arg(long, env = "ALERT_THRESHOLD")]
    pub stability_threshold: Option<f64>,

    /// Base URL of the rig-control API.
    #[arg(long, env = "ASIC_API_URL")]
    pub rig_api_url: Option<String>,

    /// Grid meter address, `ip` or `ip:port`.
    #[arg(long, env = "GRID_SENSOR_IP")]
    pub grid_sensor: Option<String>,
}

impl ConfigOverrides {
    /// Load the config file (or defaults) and apply overrides. The result
    /// is not validated.
    pub fn load(&self) -> anyhow::Result<PowerCycleConfig> {
        let mut config = match &self.config {
            Some(path) => PowerCycleConfig::from_file(path)?,
            None => PowerCycleConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut PowerCycleConfig) {
        if let Some(v) = &self.poll_interval {
            config.scheduler.poll_interval = v.clone();
        }
        if let Some(v) = self.unit_power_kw {
            config.scheduler.unit_power_kw = v;
        }
        if let Some(v) = self.stability_threshold {
            config.stability.threshold_hz = v;
        }
        if let Some(v) = &self.rig_api_url {
            config.rig.api_url = v.clone();
        }
        if let Some(v) = &self.grid_sensor {
            config.stability.sensor_addr = match v.parse::<IpAddr>() {
                Ok(ip) => SocketAddr::new(ip, MODBUS_PORT).to_string(),
                Err(_) => v.clone(),
            };
        }
    }
}
