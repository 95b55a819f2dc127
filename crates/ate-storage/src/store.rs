//! ---
//! ate_section: "03-persistence-logging"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run storage, domain model, and bench journal."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::model::{Anomaly, Reading, RunId};
use crate::run::{Run, RunStatus};
use crate::{Result, StorageError};

/// Storage surface the collector and safety monitor write through.
///
/// Implementations partition state per run id; no operation holds a
/// lock across I/O. A database-backed implementation would attach at
/// this seam.
pub trait RunStore: Send + Sync + std::fmt::Debug {
    /// Register a freshly created run.
    fn create_run(&self, run: Run) -> Result<()>;

    /// Fetch a run by id.
    fn get_run(&self, run_id: RunId) -> Option<Run>;

    /// Apply a status transition and return the run's effective status.
    ///
    /// Writes against a terminal run, and transitions the state machine
    /// does not admit, are absorbed silently (logged, not errored):
    /// emergency shutdown is allowed to race normal completion.
    fn update_status(&self, run_id: RunId, status: RunStatus) -> Result<RunStatus>;

    /// Append an anomaly to the run's ordered anomaly log.
    fn add_anomaly(&self, run_id: RunId, anomaly: Anomaly) -> Result<()>;

    /// Persist one immutable reading.
    fn insert_reading(&self, reading: Reading) -> Result<()>;

    /// Most recent reading for the run, if any.
    fn latest_reading(&self, run_id: RunId) -> Option<Reading>;

    /// Readings most-recent-first, optionally truncated to `limit`.
    fn readings(&self, run_id: RunId, limit: Option<usize>) -> Vec<Reading>;

    /// Claim an outlet for a run; rejected while another non-terminal
    /// run holds the claim.
    fn claim_outlet(&self, station_id: &str, channel: u16, run_id: RunId) -> Result<()>;

    /// Release an outlet claim held by `run_id`. Claims held by other
    /// runs are left untouched.
    fn release_outlet(&self, station_id: &str, channel: u16, run_id: RunId);
}

#[derive(Debug, Default)]
struct StoreInner {
    runs: HashMap<RunId, Run>,
    readings: HashMap<RunId, Vec<Reading>>,
    claims: HashMap<(String, u16), RunId>,
}

/// In-memory [`RunStore`] used by the bench runtime and tests.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    inner: RwLock<StoreInner>,
}

impl MemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of readings currently held for a run.
    pub fn reading_count(&self, run_id: RunId) -> usize {
        self.inner
            .read()
            .readings
            .get(&run_id)
            .map_or(0, Vec::len)
    }
}

impl RunStore for MemoryRunStore {
    fn create_run(&self, run: Run) -> Result<()> {
        let mut inner = self.inner.write();
        debug!(run_id = %run.id, station = %run.station_id, "run created");
        inner.runs.insert(run.id, run);
        Ok(())
    }

    fn get_run(&self, run_id: RunId) -> Option<Run> {
        self.inner.read().runs.get(&run_id).cloned()
    }

    fn update_status(&self, run_id: RunId, status: RunStatus) -> Result<RunStatus> {
        let mut inner = self.inner.write();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StorageError::UnknownRun(run_id))?;

        if run.status.is_terminal() {
            debug!(run_id = %run_id, current = %run.status, requested = %status,
                "status write on terminal run ignored");
            return Ok(run.status);
        }
        if !run.status.admits(status) {
            warn!(run_id = %run_id, current = %run.status, requested = %status,
                "inadmissible status transition ignored");
            return Ok(run.status);
        }

        run.status = status;
        if status.is_terminal() {
            run.ended_at = Some(Utc::now());
        }
        debug!(run_id = %run_id, status = %status, "run status updated");
        Ok(status)
    }

    fn add_anomaly(&self, run_id: RunId, anomaly: Anomaly) -> Result<()> {
        let mut inner = self.inner.write();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StorageError::UnknownRun(run_id))?;
        warn!(run_id = %run_id, kind = %anomaly.kind, message = %anomaly.message,
            "anomaly recorded");
        run.anomalies.push(anomaly);
        Ok(())
    }

    fn insert_reading(&self, reading: Reading) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.runs.contains_key(&reading.run_id) {
            return Err(StorageError::UnknownRun(reading.run_id));
        }
        inner
            .readings
            .entry(reading.run_id)
            .or_default()
            .push(reading);
        Ok(())
    }

    fn latest_reading(&self, run_id: RunId) -> Option<Reading> {
        self.inner
            .read()
            .readings
            .get(&run_id)
            .and_then(|rows| rows.last().cloned())
    }

    fn readings(&self, run_id: RunId, limit: Option<usize>) -> Vec<Reading> {
        let inner = self.inner.read();
        let Some(rows) = inner.readings.get(&run_id) else {
            return Vec::new();
        };
        let take = limit.unwrap_or(rows.len());
        rows.iter().rev().take(take).cloned().collect()
    }

    fn claim_outlet(&self, station_id: &str, channel: u16, run_id: RunId) -> Result<()> {
        let mut inner = self.inner.write();
        let key = (station_id.to_owned(), channel);
        if let Some(&holder) = inner.claims.get(&key) {
            let holder_active = inner
                .runs
                .get(&holder)
                .is_some_and(|run| !run.status.is_terminal());
            if holder_active && holder != run_id {
                return Err(StorageError::OutletBusy {
                    station: station_id.to_owned(),
                    channel,
                    holder,
                });
            }
        }
        inner.claims.insert(key, run_id);
        debug!(run_id = %run_id, station = station_id, channel, "outlet claimed");
        Ok(())
    }

    fn release_outlet(&self, station_id: &str, channel: u16, run_id: RunId) {
        let mut inner = self.inner.write();
        let key = (station_id.to_owned(), channel);
        if inner.claims.get(&key) == Some(&run_id) {
            inner.claims.remove(&key);
            debug!(run_id = %run_id, station = station_id, channel, "outlet released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Anomaly;

    fn reading(run_id: RunId, watts: f64) -> Reading {
        Reading {
            run_id,
            timestamp: Utc::now(),
            watts: Some(watts),
            volts: None,
            amps: None,
            temp_c: None,
            pressure: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn readings_return_most_recent_first() {
        let store = MemoryRunStore::new();
        let run = Run::new("bench-a", 0, "vacuum");
        let run_id = run.id;
        store.create_run(run).unwrap();

        for watts in [100.0, 200.0, 300.0] {
            store.insert_reading(reading(run_id, watts)).unwrap();
        }

        let latest = store.latest_reading(run_id).unwrap();
        assert_eq!(latest.watts, Some(300.0));

        let rows = store.readings(run_id, Some(2));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].watts, Some(300.0));
        assert_eq!(rows[1].watts, Some(200.0));
    }

    #[test]
    fn terminal_status_absorbs_later_writes() {
        let store = MemoryRunStore::new();
        let run = Run::new("bench-a", 0, "vacuum");
        let run_id = run.id;
        store.create_run(run).unwrap();

        store.update_status(run_id, RunStatus::InProgress).unwrap();
        store.update_status(run_id, RunStatus::Aborted).unwrap();
        let effective = store.update_status(run_id, RunStatus::Completed).unwrap();
        assert_eq!(effective, RunStatus::Aborted);
        assert!(store.get_run(run_id).unwrap().ended_at.is_some());
    }

    #[test]
    fn inadmissible_jump_is_ignored() {
        let store = MemoryRunStore::new();
        let run = Run::new("bench-a", 0, "vacuum");
        let run_id = run.id;
        store.create_run(run).unwrap();

        let effective = store.update_status(run_id, RunStatus::Completed).unwrap();
        assert_eq!(effective, RunStatus::Pending);
    }

    #[test]
    fn outlet_claim_exclusive_while_holder_active() {
        let store = MemoryRunStore::new();
        let first = Run::new("bench-a", 3, "vacuum");
        let second = Run::new("bench-a", 3, "vacuum");
        let (first_id, second_id) = (first.id, second.id);
        store.create_run(first).unwrap();
        store.create_run(second).unwrap();

        store.claim_outlet("bench-a", 3, first_id).unwrap();
        let err = store.claim_outlet("bench-a", 3, second_id).unwrap_err();
        assert!(matches!(err, StorageError::OutletBusy { .. }));

        store.update_status(first_id, RunStatus::Aborted).unwrap();
        store.claim_outlet("bench-a", 3, second_id).unwrap();
    }

    #[test]
    fn release_ignores_foreign_claims() {
        let store = MemoryRunStore::new();
        let holder = Run::new("bench-a", 1, "vacuum");
        let other = Run::new("bench-a", 1, "vacuum");
        let (holder_id, other_id) = (holder.id, other.id);
        store.create_run(holder).unwrap();
        store.create_run(other).unwrap();

        store.claim_outlet("bench-a", 1, holder_id).unwrap();
        store.release_outlet("bench-a", 1, other_id);
        let err = store.claim_outlet("bench-a", 1, other_id).unwrap_err();
        assert!(matches!(err, StorageError::OutletBusy { .. }));
    }

    #[test]
    fn anomalies_append_in_order() {
        let store = MemoryRunStore::new();
        let run = Run::new("bench-a", 0, "icemaker");
        let run_id = run.id;
        store.create_run(run).unwrap();

        store
            .add_anomaly(run_id, Anomaly::overcurrent(16.2, 15.0))
            .unwrap();
        store
            .add_anomaly(run_id, Anomaly::health_fail("timeout"))
            .unwrap();

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.anomalies.len(), 2);
        assert_eq!(run.anomalies[0].kind, crate::model::AnomalyKind::Overcurrent);
    }
}
