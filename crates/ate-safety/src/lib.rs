//! ---
//! ate_section: "05-safety-monitoring"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Safety precondition checks and threshold monitoring."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
//! Safety monitoring for active test runs.
//!
//! Two independent periodic checks per monitored run: a fast reading
//! check evaluating spike and overcurrent thresholds against the latest
//! persisted sample, and a slow controller health probe. Either can
//! trigger the fixed-order emergency shutdown sequence.

mod monitor;
mod preconditions;

pub use monitor::{MonitorTiming, SafetyMonitor};
pub use preconditions::{validate_safety, SafetyViolation};
