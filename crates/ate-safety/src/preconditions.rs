//! ---
//! ate_section: "05-safety-monitoring"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Safety precondition checks and threshold monitoring."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use serde::Serialize;

use ate_common::config::ControllerType;
use ate_storage::{Outlet, Station};

/// A precondition that blocks energizing a station/outlet pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyViolation {
    /// No ground-fault interrupter on the bench feed.
    GfciMissing,
    /// No operator has signed off the station checklist.
    NotAcknowledged,
    /// The outlet is administratively disabled.
    OutletDisabled,
    /// The outlet cannot be switched remotely and the station is not
    /// operator-run, so nothing could de-energize it in an emergency.
    NotSwitchable,
}

impl std::fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SafetyViolation::GfciMissing => "station has no GFCI on the bench feed",
            SafetyViolation::NotAcknowledged => "station safety checklist not acknowledged",
            SafetyViolation::OutletDisabled => "outlet is disabled",
            SafetyViolation::NotSwitchable => {
                "outlet cannot be switched remotely and controller is not manual"
            }
        };
        f.write_str(text)
    }
}

/// Check every precondition for energizing `outlet` on `station`.
///
/// Returns the violated preconditions; an empty list means the pair is
/// safe to energize.
pub fn validate_safety(station: &Station, outlet: &Outlet) -> Vec<SafetyViolation> {
    let mut violations = Vec::new();
    if !station.safety.gfci_present {
        violations.push(SafetyViolation::GfciMissing);
    }
    if !station.safety.acknowledged() {
        violations.push(SafetyViolation::NotAcknowledged);
    }
    if !outlet.enabled {
        violations.push(SafetyViolation::OutletDisabled);
    }
    if !outlet.supports_on_off && station.controller != ControllerType::Manual {
        violations.push(SafetyViolation::NotSwitchable);
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use ate_storage::SafetyFlags;

    fn station(controller: ControllerType) -> Station {
        Station {
            id: "bench-a".to_owned(),
            name: "Bench A".to_owned(),
            controller,
            address: Some("http://10.1.0.10".to_owned()),
            snmp_community: "private".to_owned(),
            safety: SafetyFlags {
                gfci_present: true,
                acknowledged_by: Some("op-1".to_owned()),
            },
        }
    }

    fn outlet() -> Outlet {
        Outlet {
            station_id: "bench-a".to_owned(),
            channel: 0,
            label: "left".to_owned(),
            enabled: true,
            supports_on_off: true,
            max_amps: Some(15.0),
        }
    }

    #[test]
    fn safe_pair_returns_no_violations() {
        assert!(validate_safety(&station(ControllerType::Relay), &outlet()).is_empty());
    }

    #[test]
    fn each_precondition_is_reported() {
        let mut s = station(ControllerType::Relay);
        s.safety.gfci_present = false;
        s.safety.acknowledged_by = None;
        let mut o = outlet();
        o.enabled = false;
        o.supports_on_off = false;

        let violations = validate_safety(&s, &o);
        assert_eq!(
            violations,
            vec![
                SafetyViolation::GfciMissing,
                SafetyViolation::NotAcknowledged,
                SafetyViolation::OutletDisabled,
                SafetyViolation::NotSwitchable,
            ]
        );
    }

    #[test]
    fn manual_station_tolerates_unswitchable_outlet() {
        let mut o = outlet();
        o.supports_on_off = false;
        assert!(validate_safety(&station(ControllerType::Manual), &o).is_empty());
        assert_eq!(
            validate_safety(&station(ControllerType::Monitor), &o),
            vec![SafetyViolation::NotSwitchable]
        );
    }

    #[test]
    fn blank_acknowledgement_counts_as_missing() {
        let mut s = station(ControllerType::Relay);
        s.safety.acknowledged_by = Some("  ".to_owned());
        assert_eq!(
            validate_safety(&s, &outlet()),
            vec![SafetyViolation::NotAcknowledged]
        );
    }
}
