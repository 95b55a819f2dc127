//! ---
//! ate_section: "03-persistence-logging"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run storage, domain model, and bench journal."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{Anomaly, RunId};
use crate::run::RunStatus;
use crate::Result;

const JOURNAL_VERSION: u16 = 1;

/// First line of every journal file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalHeader {
    version: u16,
    created_at: DateTime<Utc>,
}

/// One run lifecycle event mirrored into the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Sequential identifier assigned when appending.
    pub sequence: u64,
    /// When the event was journaled.
    pub timestamp: DateTime<Utc>,
    /// Run the event belongs to.
    pub run_id: RunId,
    /// Event discriminator (`status`, `anomaly`).
    pub event: String,
    /// Event detail payload.
    pub payload: serde_json::Value,
}

#[derive(Debug)]
struct JournalInner {
    writer: BufWriter<File>,
    next_sequence: u64,
}

/// Append-only JSONL journal of run status transitions and anomalies.
///
/// The journal is advisory: callers log append failures and continue,
/// so a full disk can never stall the shutdown path.
#[derive(Debug)]
pub struct BenchJournal {
    path: PathBuf,
    inner: Mutex<JournalInner>,
}

impl BenchJournal {
    /// Open a journal for appending, writing a header if the file is new.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let fresh = !path.exists() || fs::metadata(path)?.len() == 0;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        let next_sequence = if fresh {
            let header = JournalHeader {
                version: JOURNAL_VERSION,
                created_at: Utc::now(),
            };
            let line = serde_json::to_string(&header)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            0
        } else {
            last_sequence(path)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(JournalInner {
                writer,
                next_sequence,
            }),
        })
    }

    /// Path the journal writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and return its assigned sequence number.
    pub fn append(
        &self,
        run_id: RunId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.next_sequence += 1;
        let entry = JournalEntry {
            sequence: inner.next_sequence,
            timestamp: Utc::now(),
            run_id,
            event: event.to_owned(),
            payload,
        };
        let line = serde_json::to_string(&entry)?;
        inner.writer.write_all(line.as_bytes())?;
        inner.writer.write_all(b"\n")?;
        inner.writer.flush()?;
        Ok(entry.sequence)
    }

    /// Journal a status transition.
    pub fn record_status(&self, run_id: RunId, status: RunStatus) -> Result<u64> {
        self.append(
            run_id,
            "status",
            serde_json::json!({ "status": status }),
        )
    }

    /// Journal an anomaly.
    pub fn record_anomaly(&self, run_id: RunId, anomaly: &Anomaly) -> Result<u64> {
        self.append(run_id, "anomaly", serde_json::to_value(anomaly)?)
    }

    /// Read every entry back, skipping the header line.
    pub fn replay(path: &Path) -> Result<Vec<JournalEntry>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 || line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

fn last_sequence(path: &Path) -> Result<u64> {
    Ok(BenchJournal::replay(path)?
        .last()
        .map_or(0, |entry| entry.sequence))
}

/// [`RunStore`](crate::RunStore) decorator that mirrors lifecycle
/// mutations into a [`BenchJournal`].
///
/// Journal failures are logged and swallowed; the store mutation is
/// already durable by the time the journal line is attempted.
#[derive(Debug)]
pub struct JournaledStore {
    inner: std::sync::Arc<dyn crate::RunStore>,
    journal: BenchJournal,
}

impl JournaledStore {
    /// Wrap `inner`, mirroring events into `journal`.
    pub fn new(inner: std::sync::Arc<dyn crate::RunStore>, journal: BenchJournal) -> Self {
        Self { inner, journal }
    }

    fn journal_event(&self, run_id: RunId, event: &str, payload: serde_json::Value) {
        if let Err(err) = self.journal.append(run_id, event, payload) {
            tracing::warn!(run_id = %run_id, event, error = %err, "journal append failed");
        }
    }
}

impl crate::RunStore for JournaledStore {
    fn create_run(&self, run: crate::Run) -> Result<()> {
        let run_id = run.id;
        let payload = serde_json::json!({
            "station": run.station_id,
            "channel": run.outlet_channel,
            "profile": run.profile_id,
        });
        self.inner.create_run(run)?;
        self.journal_event(run_id, "created", payload);
        Ok(())
    }

    fn get_run(&self, run_id: RunId) -> Option<crate::Run> {
        self.inner.get_run(run_id)
    }

    fn update_status(&self, run_id: RunId, status: RunStatus) -> Result<RunStatus> {
        let prior = self.inner.get_run(run_id).map(|run| run.status);
        let effective = self.inner.update_status(run_id, status)?;
        if prior != Some(effective) {
            self.journal_event(
                run_id,
                "status",
                serde_json::json!({ "status": effective }),
            );
        }
        Ok(effective)
    }

    fn add_anomaly(&self, run_id: RunId, anomaly: Anomaly) -> Result<()> {
        let payload = serde_json::to_value(&anomaly).unwrap_or_default();
        self.inner.add_anomaly(run_id, anomaly)?;
        self.journal_event(run_id, "anomaly", payload);
        Ok(())
    }

    fn insert_reading(&self, reading: crate::Reading) -> Result<()> {
        self.inner.insert_reading(reading)
    }

    fn latest_reading(&self, run_id: RunId) -> Option<crate::Reading> {
        self.inner.latest_reading(run_id)
    }

    fn readings(&self, run_id: RunId, limit: Option<usize>) -> Vec<crate::Reading> {
        self.inner.readings(run_id, limit)
    }

    fn claim_outlet(&self, station_id: &str, channel: u16, run_id: RunId) -> Result<()> {
        self.inner.claim_outlet(station_id, channel, run_id)
    }

    fn release_outlet(&self, station_id: &str, channel: u16, run_id: RunId) {
        self.inner.release_outlet(station_id, channel, run_id);
    }
}
