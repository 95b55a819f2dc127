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

use crate::model::{Anomaly, RunId};

/// Lifecycle state of a test run.
///
/// `Pending → InProgress → {Completed, Failed, Aborted}`. The three end
/// states are terminal: a status write against a terminal run is a
/// silent no-op, because emergency shutdown may race the run's natural
/// completion and neither side should error on losing that race.
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
pub enum RunStatus {
    /// Created but not yet energized.
    Pending,
    /// Energized and under collection/monitoring.
    InProgress,
    /// Test plan finished and scored a pass.
    Completed,
    /// Test plan finished and scored a fail.
    Failed,
    /// Stopped by emergency shutdown or operator cancellation.
    Aborted,
}

impl RunStatus {
    /// Whether this status accepts no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Aborted
        )
    }

    /// Whether the state machine admits `self → next`.
    pub fn admits(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => matches!(
                next,
                RunStatus::InProgress | RunStatus::Aborted
            ),
            RunStatus::InProgress => next.is_terminal(),
            _ => false,
        }
    }
}

/// One test run: references to station/outlet/profile plus lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// Station the run executes on.
    pub station_id: String,
    /// Outlet channel the appliance is plugged into.
    pub outlet_channel: u16,
    /// Profile supplying thresholds and checklist.
    pub profile_id: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
    /// Ordered log of detected safety violations.
    pub anomalies: Vec<Anomaly>,
    /// Overall outcome summary set by the test plan.
    pub result: Option<String>,
}

impl Run {
    /// Create a pending run for the given station/outlet/profile.
    pub fn new(station_id: &str, outlet_channel: u16, profile_id: &str) -> Self {
        Self {
            id: RunId::new(),
            station_id: station_id.to_owned(),
            outlet_channel,
            profile_id: profile_id.to_owned(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            anomalies: Vec::new(),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_admits_in_progress_and_abort_only() {
        assert!(RunStatus::Pending.admits(RunStatus::InProgress));
        assert!(RunStatus::Pending.admits(RunStatus::Aborted));
        assert!(!RunStatus::Pending.admits(RunStatus::Completed));
        assert!(!RunStatus::Pending.admits(RunStatus::Failed));
    }

    #[test]
    fn in_progress_admits_terminals_only() {
        for next in [RunStatus::Completed, RunStatus::Failed, RunStatus::Aborted] {
            assert!(RunStatus::InProgress.admits(next));
        }
        assert!(!RunStatus::InProgress.admits(RunStatus::Pending));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Aborted] {
            assert!(terminal.is_terminal());
            for next in [
                RunStatus::Pending,
                RunStatus::InProgress,
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Aborted,
            ] {
                assert!(!terminal.admits(next));
            }
        }
    }
}
