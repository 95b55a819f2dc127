//! ---
//! ate_section: "02-hardware-adapters"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Power controller capability trait and protocol adapters."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
//! Protocol adapters for the bench power controllers.
//!
//! Each station's hardware class gets one adapter implementing
//! [`PowerController`]. Callers only ever see the trait object returned
//! by [`controller_for`]; variant-specific details stay inside the
//! adapter files.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ate_common::config::{BenchConfig, ControllerType};
use ate_storage::{Outlet, Station};

pub mod manual;
pub mod meter;
pub mod pdu;
pub mod relay;

pub use manual::ManualController;
pub use meter::MeterController;
pub use pdu::PduController;
pub use relay::RelayController;

/// Result alias used throughout the controllers crate.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Error type for controller construction and fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Station configuration cannot drive this controller class.
    #[error("controller configuration error: {0}")]
    Config(String),
    /// HTTP transport failure, including client-side timeouts.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// SNMP transport or encoding failure.
    #[error("snmp error: {0}")]
    Snmp(String),
    /// The controller answered with a payload the adapter cannot read.
    #[error("unexpected controller payload: {0}")]
    Payload(String),
}

/// One point sample straight off the controller, prior to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantReading {
    /// Real power in watts, when metered.
    pub watts: Option<f64>,
    /// Line voltage in volts, when metered.
    pub volts: Option<f64>,
    /// Line current in amps, when metered.
    pub amps: Option<f64>,
    /// Raw controller payload for post-mortem analysis.
    pub raw: Value,
}

impl InstantReading {
    /// A sample with no metered fields, tagged with its origin.
    pub fn empty(raw: Value) -> Self {
        Self {
            watts: None,
            volts: None,
            amps: None,
            raw,
        }
    }
}

/// Outcome of a controller health probe. Never an error by contract:
/// adapters fold their own failures into `ok: false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Whether the controller answered and looked sane.
    pub ok: bool,
    /// Probe detail, or the failure text when `ok` is false.
    pub details: String,
}

impl HealthReport {
    /// Healthy probe outcome.
    pub fn healthy(details: impl Into<String>) -> Self {
        Self {
            ok: true,
            details: details.into(),
        }
    }

    /// Failed probe outcome.
    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            ok: false,
            details: details.into(),
        }
    }
}

/// Capability set every power controller adapter implements.
#[async_trait]
pub trait PowerController: Send + Sync + std::fmt::Debug {
    /// Hardware class this adapter drives.
    fn controller_type(&self) -> ControllerType;

    /// Energize the outlet. Failures propagate: the caller decides
    /// whether a failed turn-on aborts the run.
    async fn turn_on(&self, station: &Station, outlet: &Outlet) -> Result<()>;

    /// De-energize the outlet. Infallible by contract: this runs on the
    /// emergency-shutdown path, so adapters catch and log their own
    /// failures instead of raising.
    async fn turn_off(&self, station: &Station, outlet: &Outlet);

    /// Fetch one metering sample, bounded by the configured controller
    /// timeout. Errors are transient read failures, not safety events.
    async fn instant_readings(&self, station: &Station, outlet: &Outlet)
        -> Result<InstantReading>;

    /// Probe controller liveness. Infallible by contract: internal
    /// failures come back as `ok: false`.
    async fn health_check(&self, station: &Station) -> HealthReport;
}

/// Resolve a station's controller into an adapter instance.
///
/// Pure function of the controller-type discriminant. Configuration
/// problems (missing address, unparseable SNMP target) surface here,
/// before anything is energized — never at first use.
pub fn controller_for(
    station: &Station,
    bench: &BenchConfig,
) -> Result<Arc<dyn PowerController>> {
    match station.controller {
        ControllerType::Relay => Ok(Arc::new(RelayController::new(
            required_address(station)?,
            bench.controller_timeout,
        )?)),
        ControllerType::Monitor => Ok(Arc::new(MeterController::new(
            required_address(station)?,
            bench.controller_timeout,
        )?)),
        ControllerType::Pdu => Ok(Arc::new(PduController::new(
            required_address(station)?,
            &station.snmp_community,
            bench.controller_timeout,
        )?)),
        ControllerType::Manual => Ok(Arc::new(ManualController::new(&station.id))),
    }
}

fn required_address(station: &Station) -> Result<&str> {
    station
        .address
        .as_deref()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| {
            ControllerError::Config(format!(
                "station {} has controller type {} but no address",
                station.id, station.controller
            ))
        })
}
