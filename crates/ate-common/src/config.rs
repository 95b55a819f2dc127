//! ---
//! ate_section: "01-core-functionality"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Shared primitives and utilities for the bench runtime."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_collect_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_reading_check_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_spike_debounce() -> Duration {
    Duration::from_millis(250)
}

fn default_controller_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("target/bench-journal/events.jsonl")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_snmp_community() -> String {
    "private".to_owned()
}

fn default_enabled() -> bool {
    true
}

/// Primary configuration object for the bench daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stations: IndexMap<String, StationConfig>,
    #[serde(default)]
    pub profiles: IndexMap<String, ProfileConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "ATE_CONFIG";

    /// Load configuration from disk, respecting the `ATE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would fail at run start rather than at load.
    pub fn validate(&self) -> Result<()> {
        self.bench.validate()?;
        for (station_id, station) in &self.stations {
            station
                .validate()
                .with_context(|| format!("invalid station {station_id}"))?;
        }
        for (profile_id, profile) in &self.profiles {
            profile
                .validate()
                .with_context(|| format!("invalid profile {profile_id}"))?;
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bench: BenchConfig::default(),
            logging: LoggingConfig::default(),
            stations: IndexMap::new(),
            profiles: IndexMap::new(),
        }
    }
}

/// Polling cadences and hardware timeouts shared across the bench runtime.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Collector poll interval per active run.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_collect_interval", rename = "collect_interval_ms")]
    pub collect_interval: Duration,
    /// Safety monitor reading-check cadence.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(
        default = "default_reading_check_interval",
        rename = "reading_check_interval_ms"
    )]
    pub reading_check_interval: Duration,
    /// Safety monitor controller health-check cadence.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(
        default = "default_health_check_interval",
        rename = "health_check_interval_s"
    )]
    pub health_check_interval: Duration,
    /// How long a power spike must hold before shutdown fires.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_spike_debounce", rename = "spike_debounce_ms")]
    pub spike_debounce: Duration,
    /// Upper bound on a single controller read or health probe.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_controller_timeout", rename = "controller_timeout_s")]
    pub controller_timeout: Duration,
    /// Append-only journal of run lifecycle events.
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
}

impl BenchConfig {
    fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("collect_interval_ms", self.collect_interval),
            ("reading_check_interval_ms", self.reading_check_interval),
            ("health_check_interval_s", self.health_check_interval),
            ("controller_timeout_s", self.controller_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{label} must be greater than zero"));
            }
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            collect_interval: default_collect_interval(),
            reading_check_interval: default_reading_check_interval(),
            health_check_interval: default_health_check_interval(),
            spike_debounce: default_spike_debounce(),
            controller_timeout: default_controller_timeout(),
            journal_path: default_journal_path(),
        }
    }
}

/// Hardware class a station's power controller belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ControllerType {
    /// HTTP smart relay with real switching and per-channel metering.
    Relay,
    /// HTTP energy monitor with CT clamps; metering only, cannot switch.
    Monitor,
    /// SNMP-managed PDU with outlet switching and bank metering.
    Pdu,
    /// Human-operated station with no automatable hardware.
    Manual,
}

impl ControllerType {
    /// Whether this controller class talks to hardware over the network.
    pub fn is_networked(self) -> bool {
        !matches!(self, ControllerType::Manual)
    }
}

/// One physical bench station and its power controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    pub controller: ControllerType,
    /// Base address of the controller (HTTP base URL or SNMP host:port).
    #[serde(default)]
    pub address: Option<String>,
    /// SNMP community string; only meaningful for PDU controllers.
    #[serde(default = "default_snmp_community")]
    pub snmp_community: String,
    #[serde(default)]
    pub gfci_present: bool,
    /// Operator who signed off the station safety checklist.
    #[serde(default)]
    pub acknowledged_by: Option<String>,
    #[serde(default)]
    pub outlets: Vec<OutletConfig>,
}

impl StationConfig {
    fn validate(&self) -> Result<()> {
        if self.controller.is_networked()
            && self
                .address
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            return Err(anyhow!(
                "controller type {} requires an address",
                self.controller
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for outlet in &self.outlets {
            if !seen.insert(outlet.channel) {
                return Err(anyhow!("duplicate outlet channel {}", outlet.channel));
            }
        }
        Ok(())
    }
}

/// A switchable or metered channel within a station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutletConfig {
    pub channel: u16,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_enabled")]
    pub supports_on_off: bool,
    /// Hard current ceiling; exceeding it aborts the run immediately.
    #[serde(default)]
    pub max_amps: Option<f64>,
}

/// Product-category test thresholds and the operator checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub category: String,
    pub max_peak_watts: f64,
    pub min_stable_watts: f64,
    pub max_stable_watts: f64,
    pub spike_shutdown_watts: f64,
    pub min_run_seconds: u64,
    #[serde(default)]
    pub checklist: Vec<String>,
}

impl ProfileConfig {
    fn validate(&self) -> Result<()> {
        if self.spike_shutdown_watts <= 0.0 {
            return Err(anyhow!("spike_shutdown_watts must be positive"));
        }
        if self.min_stable_watts > self.max_stable_watts {
            return Err(anyhow!(
                "min_stable_watts {} exceeds max_stable_watts {}",
                self.min_stable_watts,
                self.max_stable_watts
            ));
        }
        Ok(())
    }
}

/// Logging destination and format selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}
