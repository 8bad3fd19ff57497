//! powercycle.toml configuration parser.
//!
//! Every field has a default, so an empty file is a valid configuration
//! for a site that only sets a few values. [`PowerCycleConfig::validate`]
//! must pass before anything is started.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::types::{UnitPower, is_valid_device_id};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerCycleConfig {
    pub scheduler: SchedulerConfig,
    pub stability: StabilityConfig,
    pub power: PowerConfig,
    pub rig: RigConfig,
    pub alerts: AlertsConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub devices: DevicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between scheduling passes.
    pub poll_interval: String,
    /// How long a successful command is trusted before it is re-sent.
    pub command_ttl: String,
    /// Upper bound on a single device-port call.
    pub command_timeout: String,
    /// Device commands dispatched concurrently within one pass.
    pub max_in_flight: usize,
    /// Power draw of one active device, in kW.
    pub unit_power_kw: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: "10s".to_string(),
            command_ttl: "60s".to_string(),
            command_timeout: "5s".to_string(),
            max_in_flight: 8,
            unit_power_kw: 3.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Readings below this value forbid activation (Hz).
    pub threshold_hz: f64,
    /// Value reported when the sensor cannot be read (Hz).
    pub fallback_hz: f64,
    /// Modbus-TCP address of the grid meter.
    pub sensor_addr: String,
    /// Modbus unit identifier.
    pub unit_id: u8,
    /// Holding register carrying the frequency.
    pub register: u16,
    /// Raw register value is divided by this.
    pub scale: f64,
    pub read_timeout: String,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            threshold_hz: 49.5,
            fallback_hz: 50.0,
            sensor_addr: "192.168.1.100:502".to_string(),
            unit_id: 1,
            register: 100,
            scale: 100.0,
            read_timeout: "2s".to_string(),
        }
    }
}

impl StabilityConfig {
    pub fn sensor_socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.sensor_addr.parse().map_err(|_| {
            ConfigError::invalid(
                "stability.sensor_addr",
                format!("`{}` is not a host:port socket address", self.sensor_addr),
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// HTTP endpoint returning `{"current": A, "voltage": V}`. When unset,
    /// `static_kw` is used as the available power.
    pub meter_url: Option<String>,
    pub static_kw: f64,
    /// Value reported when the meter cannot be read (kW).
    pub fallback_kw: f64,
    /// Alert when measured power exceeds this (kW).
    pub safe_ceiling_kw: f64,
    pub read_timeout: String,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            meter_url: None,
            static_kw: 0.0,
            fallback_kw: 0.0,
            safe_ceiling_kw: 560.0,
            read_timeout: "2s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Base URL of the rig-control API.
    pub api_url: String,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            api_url: "http://192.168.1.200:4028".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Optional webhook receiving `{"message": ...}` POSTs.
    pub webhook_url: Option<String>,
    pub timeout: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Upstream URL checked every tick. Any HTTP response counts as
    /// reachable. When unset, connectivity is not tracked.
    pub check_url: Option<String>,
    pub timeout: String,
    /// Local pool server started while the upstream is unreachable,
    /// as program and arguments. Empty disables it.
    pub fallback_pool_command: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            check_url: None,
            timeout: "5s".to_string(),
            fallback_pool_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Dashboard / metrics listen port.
    pub port: u16,
    /// Directory holding the device ledger.
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            data_dir: PathBuf::from("/var/lib/powercycle"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Devices registered in the ledger at startup.
    pub ids: Vec<String>,
}

/// Parsed, validated values the scheduler and driver run on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub command_ttl: Duration,
    pub command_timeout: Duration,
    pub max_in_flight: usize,
    pub unit_power: UnitPower,
    pub stability_threshold: f64,
    pub safe_ceiling_kw: f64,
}

impl PowerCycleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check every section. Returns the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        self.scheduler_settings()?;

        let stability = &self.stability;
        positive_finite("stability.fallback_hz", stability.fallback_hz)?;
        positive_finite("stability.scale", stability.scale)?;
        duration("stability.read_timeout", &stability.read_timeout)?;
        stability.sensor_socket_addr()?;

        let power = &self.power;
        non_negative_finite("power.static_kw", power.static_kw)?;
        non_negative_finite("power.fallback_kw", power.fallback_kw)?;
        duration("power.read_timeout", &power.read_timeout)?;
        if let Some(url) = &power.meter_url {
            http_url("power.meter_url", url)?;
        }

        http_url("rig.api_url", &self.rig.api_url)?;
        duration("alerts.timeout", &self.alerts.timeout)?;
        if let Some(url) = &self.alerts.webhook_url {
            http_url("alerts.webhook_url", url)?;
        }

        let network = &self.network;
        duration("network.timeout", &network.timeout)?;
        if let Some(url) = &network.check_url {
            http_url("network.check_url", url)?;
        }
        if let Some(program) = network.fallback_pool_command.first() {
            if program.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "network.fallback_pool_command",
                    "program name is empty",
                ));
            }
            if network.check_url.is_none() {
                return Err(ConfigError::invalid(
                    "network.fallback_pool_command",
                    "requires network.check_url",
                ));
            }
        }

        let mut seen = HashSet::new();
        for id in &self.devices.ids {
            if !is_valid_device_id(id) {
                return Err(ConfigError::invalid(
                    "devices.ids",
                    format!("`{id}` is not a valid device id"),
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::invalid(
                    "devices.ids",
                    format!("`{id}` is listed twice"),
                ));
            }
        }

        Ok(())
    }

    /// Parse the values the scheduling loop depends on.
    pub fn scheduler_settings(&self) -> ConfigResult<SchedulerSettings> {
        let s = &self.scheduler;
        if s.max_in_flight == 0 {
            return Err(ConfigError::invalid(
                "scheduler.max_in_flight",
                "must be at least 1",
            ));
        }
        Ok(SchedulerSettings {
            poll_interval: duration("scheduler.poll_interval", &s.poll_interval)?,
            command_ttl: duration("scheduler.command_ttl", &s.command_ttl)?,
            command_timeout: duration("scheduler.command_timeout", &s.command_timeout)?,
            max_in_flight: s.max_in_flight,
            unit_power: UnitPower::new(s.unit_power_kw)?,
            stability_threshold: positive_finite(
                "stability.threshold_hz",
                self.stability.threshold_hz,
            )?,
            safe_ceiling_kw: positive_finite("power.safe_ceiling_kw", self.power.safe_ceiling_kw)?,
        })
    }
}

/// Parse a non-zero duration field.
pub fn duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => Err(ConfigError::invalid(field, "must be greater than zero")),
        None => Err(ConfigError::invalid(
            field,
            format!("`{value}` is not a duration (expected e.g. \"10s\", \"500ms\", \"2m\")"),
        )),
    }
}

fn positive_finite(field: &'static str, value: f64) -> ConfigResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a positive number, got {value}"),
        ))
    }
}

fn non_negative_finite(field: &'static str, value: f64) -> ConfigResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be zero or positive, got {value}"),
        ))
    }
}

fn http_url(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.starts_with("http://") && value.len() > "http://".len() {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("`{value}` must be a plain http:// URL"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = PowerCycleConfig::from_toml_str("").unwrap();
        config.validate().unwrap();

        let settings = config.scheduler_settings().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.command_ttl, Duration::from_secs(60));
        assert_eq!(settings.command_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_in_flight, 8);
        assert_eq!(settings.unit_power.kw(), 3.5);
        assert_eq!(settings.stability_threshold, 49.5);
        assert_eq!(settings.safe_ceiling_kw, 560.0);
        assert_eq!(config.stability.fallback_hz, 50.0);
        assert_eq!(config.power.fallback_kw, 0.0);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn parse_partial_sections() {
        let config = PowerCycleConfig::from_toml_str(
            r#"
[scheduler]
poll_interval = "30s"
unit_power_kw = 3.25

[devices]
ids = ["asic-01", "asic-02"]
"#,
        )
        .unwrap();
        config.validate().unwrap();

        let settings = config.scheduler_settings().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.unit_power.kw(), 3.25);
        // Untouched fields keep defaults.
        assert_eq!(settings.command_ttl, Duration::from_secs(60));
        assert_eq!(config.devices.ids.len(), 2);
    }

    #[test]
    fn zero_unit_power_is_a_config_error() {
        let mut config = PowerCycleConfig::default();
        config.scheduler.unit_power_kw = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "scheduler.unit_power_kw", .. }
        ));
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let mut config = PowerCycleConfig::default();
        config.stability.threshold_hz = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_durations_are_rejected() {
        let mut config = PowerCycleConfig::default();
        config.scheduler.command_ttl = "soon".to_string();
        assert!(config.validate().is_err());

        let mut config = PowerCycleConfig::default();
        config.scheduler.poll_interval = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_in_flight_is_rejected() {
        let mut config = PowerCycleConfig::default();
        config.scheduler.max_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_and_malformed_device_ids_are_rejected() {
        let mut config = PowerCycleConfig::default();
        config.devices.ids = vec!["a".into(), "a".into()];
        assert!(config.validate().is_err());

        config.devices.ids = vec!["has space".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn https_urls_are_rejected() {
        let mut config = PowerCycleConfig::default();
        config.rig.api_url = "https://rig.local".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn sensor_addr_must_be_a_socket_address() {
        let mut config = PowerCycleConfig::default();
        config.stability.sensor_addr = "grid-meter".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "stability.sensor_addr", .. }
        ));
    }

    #[test]
    fn network_section_parses() {
        let config = PowerCycleConfig::from_toml_str(
            r#"
[network]
check_url = "http://pool.example.com"
timeout = "3s"
fallback_pool_command = ["stratum-mining", "--host", "localhost", "--port", "3333"]
"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.network.fallback_pool_command.len(), 5);
        assert_eq!(
            config.network.check_url.as_deref(),
            Some("http://pool.example.com")
        );
    }

    #[test]
    fn fallback_pool_without_check_url_is_rejected() {
        let mut config = PowerCycleConfig::default();
        config.network.fallback_pool_command = vec!["stratum-mining".into()];
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "network.fallback_pool_command", .. }
        ));

        config.network.check_url = Some("http://pool.example.com".into());
        config.validate().unwrap();
        config.network.fallback_pool_command = vec![" ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_field_types_fail_to_parse() {
        let result = PowerCycleConfig::from_toml_str("[scheduler]\nmax_in_flight = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = PowerCycleConfig::default();
        config.devices.ids = vec!["asic-7".into()];
        let text = config.to_toml_string().unwrap();
        let parsed = PowerCycleConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.devices.ids, vec!["asic-7".to_string()]);
        assert_eq!(parsed.scheduler.unit_power_kw, 3.5);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PowerCycleConfig::from_file(Path::new("/nonexistent/powercycle.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/powercycle.toml"));
    }
}
