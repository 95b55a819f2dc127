//! ---
//! ate_section: "02-hardware-adapters"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Power controller capability trait and protocol adapters."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use ate_common::config::ControllerType;
use ate_storage::{Outlet, Station};

use crate::{HealthReport, InstantReading, PowerController, Result};

/// Human-operated station with no automatable hardware.
///
/// Every operation is a logged instruction to the operator; nothing
/// touches the network. Pass/fail for these stations rides entirely on
/// the profile's operator checklist.
#[derive(Debug, Clone)]
pub struct ManualController {
    station_id: String,
}

impl ManualController {
    /// Build the stub for a station.
    pub fn new(station_id: &str) -> Self {
        Self {
            station_id: station_id.to_owned(),
        }
    }
}

#[async_trait]
impl PowerController for ManualController {
    fn controller_type(&self) -> ControllerType {
        ControllerType::Manual
    }

    async fn turn_on(&self, _station: &Station, outlet: &Outlet) -> Result<()> {
        info!(station = %self.station_id, channel = outlet.channel,
            "manual station: operator must energize the outlet");
        Ok(())
    }

    async fn turn_off(&self, _station: &Station, outlet: &Outlet) {
        info!(station = %self.station_id, channel = outlet.channel,
            "manual station: operator must de-energize the outlet");
    }

    async fn instant_readings(
        &self,
        _station: &Station,
        _outlet: &Outlet,
    ) -> Result<InstantReading> {
        Ok(InstantReading::empty(json!({ "source": "manual" })))
    }

    async fn health_check(&self, _station: &Station) -> HealthReport {
        HealthReport::healthy("manual station; no controller to probe")
    }
}
