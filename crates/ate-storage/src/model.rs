//! ---
//! ate_section: "03-persistence-logging"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run storage, domain model, and bench journal."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ate_common::config::{ControllerType, OutletConfig, ProfileConfig, StationConfig};

/// Unique identifier for a test run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Mint a fresh run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Station safety sign-off state. Mutable while a station is idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyFlags {
    /// A ground-fault interrupter is wired into the bench feed.
    pub gfci_present: bool,
    /// Operator who acknowledged the station checklist, if any.
    pub acknowledged_by: Option<String>,
}

impl SafetyFlags {
    /// Whether an operator has signed off the station.
    pub fn acknowledged(&self) -> bool {
        self.acknowledged_by
            .as_deref()
            .map(str::trim)
            .is_some_and(|operator| !operator.is_empty())
    }
}

/// One physical bench station with its power controller identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    /// Stable station identifier (config table key).
    pub id: String,
    /// Human-facing station name.
    pub name: String,
    /// Hardware class of the attached power controller.
    pub controller: ControllerType,
    /// Controller base address (HTTP base URL or SNMP host:port).
    pub address: Option<String>,
    /// SNMP community for PDU controllers.
    pub snmp_community: String,
    /// Safety sign-off flags.
    pub safety: SafetyFlags,
}

impl Station {
    /// Build the runtime station record from its config entry.
    pub fn from_config(id: &str, config: &StationConfig) -> Self {
        Self {
            id: id.to_owned(),
            name: config.name.clone(),
            controller: config.controller,
            address: config.address.clone(),
            snmp_community: config.snmp_community.clone(),
            safety: SafetyFlags {
                gfci_present: config.gfci_present,
                acknowledged_by: config.acknowledged_by.clone(),
            },
        }
    }
}

/// A switchable or metered channel belonging to exactly one station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlet {
    /// Station this outlet belongs to.
    pub station_id: String,
    /// Channel index on the controller.
    pub channel: u16,
    /// Human-facing outlet label.
    pub label: String,
    /// Disabled outlets may never be energized.
    pub enabled: bool,
    /// Whether the controller can switch this outlet on and off.
    pub supports_on_off: bool,
    /// Hard current ceiling in amps, when fused below the bench rating.
    pub max_amps: Option<f64>,
}

impl Outlet {
    /// Build the runtime outlet record from its config entry.
    pub fn from_config(station_id: &str, config: &OutletConfig) -> Self {
        Self {
            station_id: station_id.to_owned(),
            channel: config.channel,
            label: config.label.clone(),
            enabled: config.enabled,
            supports_on_off: config.supports_on_off,
            max_amps: config.max_amps,
        }
    }
}

/// Per product-category test thresholds and operator checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Stable profile identifier (config table key).
    pub id: String,
    /// Product category the thresholds apply to.
    pub category: String,
    /// Highest instantaneous draw considered a pass.
    pub max_peak_watts: f64,
    /// Lower bound of the expected steady-state band.
    pub min_stable_watts: f64,
    /// Upper bound of the expected steady-state band.
    pub max_stable_watts: f64,
    /// Sustained draw at or above this level aborts the run.
    pub spike_shutdown_watts: f64,
    /// Minimum runtime before the plan may score the run.
    pub min_run_seconds: u64,
    /// Operator checklist items for manual stations.
    pub checklist: Vec<String>,
}

impl Profile {
    /// Build the runtime profile record from its config entry.
    pub fn from_config(id: &str, config: &ProfileConfig) -> Self {
        Self {
            id: id.to_owned(),
            category: config.category.clone(),
            max_peak_watts: config.max_peak_watts,
            min_stable_watts: config.min_stable_watts,
            max_stable_watts: config.max_stable_watts,
            spike_shutdown_watts: config.spike_shutdown_watts,
            min_run_seconds: config.min_run_seconds,
            checklist: config.checklist.clone(),
        }
    }
}

/// One immutable point sample collected for a run.
///
/// Readings for a run carry monotonically increasing timestamps; the
/// collector stamps each sample at persist time and nothing mutates a
/// reading after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Run the sample belongs to.
    pub run_id: RunId,
    /// Timestamp assigned when the sample was persisted.
    pub timestamp: DateTime<Utc>,
    /// Real power in watts, when the controller meters it.
    pub watts: Option<f64>,
    /// Line voltage in volts.
    pub volts: Option<f64>,
    /// Line current in amps.
    pub amps: Option<f64>,
    /// Appliance temperature in degrees Celsius, from external probes.
    pub temp_c: Option<f64>,
    /// Pressure reading from external probes, where instrumented.
    pub pressure: Option<f64>,
    /// Opaque controller payload the sample was parsed from.
    pub raw: serde_json::Value,
}

/// Classification of a detected safety violation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// Power held at or above the profile spike threshold.
    Spike,
    /// A single sample exceeded the outlet's current ceiling.
    Overcurrent,
    /// The controller failed its health probe.
    HealthFail,
}

/// Immutable record of a detected safety violation, appended to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Violation classification.
    pub kind: AnomalyKind,
    /// Operator-facing description of what tripped.
    pub message: String,
    /// When the violation was detected.
    pub timestamp: DateTime<Utc>,
    /// Measured value that tripped the rule, where numeric.
    pub observed: Option<f64>,
    /// Threshold the value was compared against, where numeric.
    pub threshold: Option<f64>,
}

impl Anomaly {
    /// Sustained power spike anomaly.
    pub fn spike(observed: f64, threshold: f64, held_ms: u64) -> Self {
        Self {
            kind: AnomalyKind::Spike,
            message: format!(
                "power spike: {observed:.1} W held for {held_ms} ms (shutdown threshold {threshold:.1} W)"
            ),
            timestamp: Utc::now(),
            observed: Some(observed),
            threshold: Some(threshold),
        }
    }

    /// Instantaneous overcurrent anomaly.
    pub fn overcurrent(observed: f64, threshold: f64) -> Self {
        Self {
            kind: AnomalyKind::Overcurrent,
            message: format!(
                "overcurrent: {observed:.2} A exceeds outlet ceiling {threshold:.2} A"
            ),
            timestamp: Utc::now(),
            observed: Some(observed),
            threshold: Some(threshold),
        }
    }

    /// Controller health failure anomaly; `details` comes from the probe.
    pub fn health_fail(details: &str) -> Self {
        Self {
            kind: AnomalyKind::HealthFail,
            message: format!("controller health check failed: {details}"),
            timestamp: Utc::now(),
            observed: None,
            threshold: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgement_requires_nonempty_operator() {
        let mut flags = SafetyFlags {
            gfci_present: true,
            acknowledged_by: None,
        };
        assert!(!flags.acknowledged());
        flags.acknowledged_by = Some("   ".to_owned());
        assert!(!flags.acknowledged());
        flags.acknowledged_by = Some("op-3".to_owned());
        assert!(flags.acknowledged());
    }

    #[test]
    fn anomaly_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&AnomalyKind::HealthFail).unwrap();
        assert_eq!(json, "\"HEALTH_FAIL\"");
        assert_eq!(AnomalyKind::Overcurrent.to_string(), "OVERCURRENT");
    }

    #[test]
    fn anomaly_constructors_carry_values() {
        let spike = Anomaly::spike(2150.0, 2000.0, 300);
        assert_eq!(spike.kind, AnomalyKind::Spike);
        assert_eq!(spike.observed, Some(2150.0));
        assert_eq!(spike.threshold, Some(2000.0));

        let health = Anomaly::health_fail("relay unreachable");
        assert_eq!(health.kind, AnomalyKind::HealthFail);
        assert!(health.message.contains("relay unreachable"));
        assert!(health.observed.is_none());
    }
}
