//! ---
//! ate_section: "02-hardware-adapters"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Power controller capability trait and protocol adapters."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use csnmp::{ObjectIdentifier, ObjectValue, Snmp2cClient};
use serde_json::json;
use tracing::{debug, warn};

use ate_common::config::ControllerType;
use ate_storage::{Outlet, Station};

use crate::{ControllerError, HealthReport, InstantReading, PowerController, Result};

/// APC-style rPDU register map. Outlet rows are 1-based; the control
/// column takes 1 for immediate-on and 2 for immediate-off. Bank load
/// gauges report tenths of an amp.
const OUTLET_CTL_PREFIX: &str = "1.3.6.1.4.1.318.1.1.4.4.2.1.3";
const BANK_LOAD_PREFIX: &str = "1.3.6.1.4.1.318.1.1.12.2.3.1.1.2";
const SYS_DESCR_OID: &str = "1.3.6.1.2.1.1.1.0";
const CMD_ON: i32 = 1;
const CMD_OFF: i32 = 2;
const DEFAULT_SNMP_PORT: u16 = 161;

/// SNMP-managed PDU: real outlet switching and bank-level metering.
#[derive(Debug, Clone)]
pub struct PduController {
    target: SocketAddr,
    community: Vec<u8>,
    timeout: Duration,
}

impl PduController {
    /// Build an adapter for the PDU at `address` (`ip:port` or bare `ip`).
    pub fn new(address: &str, community: &str, timeout: Duration) -> Result<Self> {
        let target = parse_target(address)?;
        Ok(Self {
            target,
            community: community.as_bytes().to_vec(),
            timeout,
        })
    }

    async fn client(&self) -> Result<Snmp2cClient> {
        Snmp2cClient::new(
            self.target,
            self.community.clone(),
            None,
            Some(self.timeout),
            0,
        )
        .await
        .map_err(|err| ControllerError::Snmp(err.to_string()))
    }

    async fn set_outlet(&self, outlet: &Outlet, command: i32) -> Result<()> {
        let oid = outlet_ctl_oid(outlet.channel)?;
        let client = self.client().await?;
        client
            .set(oid, ObjectValue::Integer(command))
            .await
            .map_err(|err| ControllerError::Snmp(err.to_string()))?;
        Ok(())
    }
}

fn parse_target(address: &str) -> Result<SocketAddr> {
    let candidate = if address.contains(':') {
        address.to_owned()
    } else {
        format!("{address}:{DEFAULT_SNMP_PORT}")
    };
    candidate.parse().map_err(|err| {
        ControllerError::Config(format!("invalid pdu address {address}: {err}"))
    })
}

fn outlet_ctl_oid(channel: u16) -> Result<ObjectIdentifier> {
    // SNMP outlet rows are 1-based; bench channels count from 0.
    parse_oid(&format!("{}.{}", OUTLET_CTL_PREFIX, u32::from(channel) + 1))
}

fn bank_load_oid(channel: u16) -> Result<ObjectIdentifier> {
    parse_oid(&format!("{}.{}", BANK_LOAD_PREFIX, bank_for_channel(channel)))
}

/// Bank index covering a given outlet channel. rPDUs meter in banks of
/// eight outlets.
fn bank_for_channel(channel: u16) -> u32 {
    u32::from(channel) / 8 + 1
}

fn parse_oid(text: &str) -> Result<ObjectIdentifier> {
    text.parse()
        .map_err(|_| ControllerError::Snmp(format!("invalid oid {text}")))
}

fn numeric(value: &ObjectValue) -> Option<i64> {
    match value {
        ObjectValue::Integer(v) => Some(i64::from(*v)),
        ObjectValue::Counter32(v) | ObjectValue::Unsigned32(v) | ObjectValue::TimeTicks(v) => {
            Some(i64::from(*v))
        }
        ObjectValue::Counter64(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

#[async_trait]
impl PowerController for PduController {
    fn controller_type(&self) -> ControllerType {
        ControllerType::Pdu
    }

    async fn turn_on(&self, station: &Station, outlet: &Outlet) -> Result<()> {
        debug!(station = %station.id, channel = outlet.channel, "pdu outlet on");
        self.set_outlet(outlet, CMD_ON).await
    }

    async fn turn_off(&self, station: &Station, outlet: &Outlet) {
        if let Err(err) = self.set_outlet(outlet, CMD_OFF).await {
            warn!(station = %station.id, channel = outlet.channel, error = %err,
                "pdu turn-off failed; continuing shutdown");
        }
    }

    async fn instant_readings(
        &self,
        _station: &Station,
        outlet: &Outlet,
    ) -> Result<InstantReading> {
        let oid = bank_load_oid(outlet.channel)?;
        let client = self.client().await?;
        let value = client
            .get(oid)
            .await
            .map_err(|err| ControllerError::Snmp(err.to_string()))?;
        let deciamps = numeric(&value).ok_or_else(|| {
            ControllerError::Payload(format!("bank load gauge answered {value:?}"))
        })?;
        let amps = deciamps as f64 / 10.0;
        Ok(InstantReading {
            watts: None,
            volts: None,
            amps: Some(amps),
            raw: json!({
                "bank": bank_for_channel(outlet.channel),
                "deciamps": deciamps,
            }),
        })
    }

    async fn health_check(&self, station: &Station) -> HealthReport {
        let probe = async {
            let oid = parse_oid(SYS_DESCR_OID)?;
            let client = self.client().await?;
            client
                .get(oid)
                .await
                .map_err(|err| ControllerError::Snmp(err.to_string()))
        };
        match probe.await {
            Ok(ObjectValue::String(descr)) => {
                HealthReport::healthy(String::from_utf8_lossy(&descr).into_owned())
            }
            Ok(other) => HealthReport::healthy(format!("pdu answered sysDescr {other:?}")),
            Err(err) => {
                warn!(station = %station.id, error = %err, "pdu health probe failed");
                HealthReport::failed(format!("pdu {} unreachable: {err}", self.target))
            }
        }
    }
}
