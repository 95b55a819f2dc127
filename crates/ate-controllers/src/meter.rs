//! ---
//! ate_section: "02-hardware-adapters"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Power controller capability trait and protocol adapters."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use url::Url;

use ate_common::config::ControllerType;
use ate_storage::{Outlet, Station};

use crate::{ControllerError, HealthReport, InstantReading, PowerController, Result};

/// HTTP energy monitor with CT clamps: metering only.
///
/// The hardware cannot switch power, so `turn_on`/`turn_off` are
/// warn-logging no-ops; stations using this class must pair it with a
/// separate physical relay. `GET {base}/status` returns the channel
/// array the samples are read from.
#[derive(Debug, Clone)]
pub struct MeterController {
    base: String,
    client: reqwest::Client,
}

impl MeterController {
    /// Build an adapter against `base` with a hard per-request timeout.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base)
            .map_err(|err| ControllerError::Config(format!("invalid monitor address {base}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ControllerError::Config(format!(
                "monitor address {base} must be http(s)"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_owned(),
            client,
        })
    }

    async fn status(&self) -> Result<Value> {
        let url = format!("{}/status", self.base);
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?)
    }
}

/// Find the outlet's channel entry in a monitor status payload.
fn channel_sample(status: &Value, channel: u16) -> Result<InstantReading> {
    let entry = status
        .get("channels")
        .and_then(Value::as_array)
        .and_then(|channels| {
            channels.iter().find(|entry| {
                entry.get("channel").and_then(Value::as_u64) == Some(u64::from(channel))
            })
        })
        .ok_or_else(|| {
            ControllerError::Payload(format!("monitor status has no channel {channel}"))
        })?;
    Ok(InstantReading {
        watts: entry.get("watts").and_then(Value::as_f64),
        volts: entry.get("volts").and_then(Value::as_f64),
        amps: entry.get("amps").and_then(Value::as_f64),
        raw: entry.clone(),
    })
}

#[async_trait]
impl PowerController for MeterController {
    fn controller_type(&self) -> ControllerType {
        ControllerType::Monitor
    }

    async fn turn_on(&self, station: &Station, outlet: &Outlet) -> Result<()> {
        warn!(station = %station.id, channel = outlet.channel,
            "monitor-only controller cannot energize; pair this station with a relay");
        Ok(())
    }

    async fn turn_off(&self, station: &Station, outlet: &Outlet) {
        warn!(station = %station.id, channel = outlet.channel,
            "monitor-only controller cannot de-energize; physical intervention required");
    }

    async fn instant_readings(
        &self,
        _station: &Station,
        outlet: &Outlet,
    ) -> Result<InstantReading> {
        let status = self.status().await?;
        channel_sample(&status, outlet.channel)
    }

    async fn health_check(&self, station: &Station) -> HealthReport {
        match self.status().await {
            Ok(_) => HealthReport::healthy(format!("monitor {} reachable", self.base)),
            Err(err) => {
                warn!(station = %station.id, error = %err, "monitor health probe failed");
                HealthReport::failed(format!("monitor {} unreachable: {err}", self.base))
            }
        }
    }
}
