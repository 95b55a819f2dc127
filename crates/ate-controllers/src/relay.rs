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
use tracing::{debug, warn};
use url::Url;

use ate_common::config::ControllerType;
use ate_storage::{Outlet, Station};

use crate::{ControllerError, HealthReport, InstantReading, PowerController, Result};

/// HTTP smart relay with real switching and per-channel metering.
///
/// Speaks the Shelly-style query surface: `GET {base}/relay/{ch}?turn=on|off`
/// to switch, `GET {base}/meter/{ch}` for a JSON metering sample, and
/// `GET {base}/status` as the liveness probe.
#[derive(Debug, Clone)]
pub struct RelayController {
    base: String,
    client: reqwest::Client,
}

impl RelayController {
    /// Build an adapter against `base` with a hard per-request timeout.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base)
            .map_err(|err| ControllerError::Config(format!("invalid relay address {base}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ControllerError::Config(format!(
                "relay address {base} must be http(s)"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_owned(),
            client,
        })
    }

    async fn switch(&self, outlet: &Outlet, state: &str) -> Result<()> {
        let url = format!("{}/relay/{}", self.base, outlet.channel);
        self.client
            .get(url)
            .query(&[("turn", state)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Pull the metered fields out of a relay meter payload.
fn parse_meter_payload(raw: Value) -> InstantReading {
    let watts = raw.get("power").and_then(Value::as_f64);
    let volts = raw.get("voltage").and_then(Value::as_f64);
    let amps = raw.get("current").and_then(Value::as_f64);
    InstantReading {
        watts,
        volts,
        amps,
        raw,
    }
}

#[async_trait]
impl PowerController for RelayController {
    fn controller_type(&self) -> ControllerType {
        ControllerType::Relay
    }

    async fn turn_on(&self, station: &Station, outlet: &Outlet) -> Result<()> {
        debug!(station = %station.id, channel = outlet.channel, "relay on");
        self.switch(outlet, "on").await
    }

    async fn turn_off(&self, station: &Station, outlet: &Outlet) {
        if let Err(err) = self.switch(outlet, "off").await {
            warn!(station = %station.id, channel = outlet.channel, error = %err,
                "relay turn-off failed; continuing shutdown");
        }
    }

    async fn instant_readings(
        &self,
        _station: &Station,
        outlet: &Outlet,
    ) -> Result<InstantReading> {
        let url = format!("{}/meter/{}", self.base, outlet.channel);
        let raw = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(parse_meter_payload(raw))
    }

    async fn health_check(&self, station: &Station) -> HealthReport {
        let url = format!("{}/status", self.base);
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                HealthReport::healthy(format!("relay {} reachable", self.base))
            }
            Ok(response) => HealthReport::failed(format!(
                "relay {} answered status {}",
                self.base,
                response.status()
            )),
            Err(err) => {
                warn!(station = %station.id, error = %err, "relay health probe failed");
                HealthReport::failed(format!("relay {} unreachable: {err}", self.base))
            }
        }
    }
}
