//! ---
//! ate_section: "04-telemetry-collection"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Per-run readings collection and persistence."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
//! Readings collection: one polling task per active run.
//!
//! The collector owns a registry keyed by run id. Each session polls
//! the run's controller on a fixed interval and persists every
//! successful sample through the [`RunStore`]. A failed poll is logged
//! and skipped; the next scheduled tick is the retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use ate_controllers::{InstantReading, PowerController};
use ate_storage::{Outlet, Reading, RunId, RunStore, Station};

/// Result alias used throughout the collector crate.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Error type for collector registry operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// A session already exists for the run; starting a second is a
    /// configuration error, not a replace.
    #[error("already collecting readings for run {0}")]
    AlreadyCollecting(RunId),
    /// Wrapper for storage failures on the manual-record path.
    #[error(transparent)]
    Storage(#[from] ate_storage::StorageError),
}

/// Sample pushed by sources the collector cannot poll (manual stations,
/// external temperature or pressure probes).
#[derive(Debug, Clone, Default)]
pub struct ExternalSample {
    /// Real power in watts.
    pub watts: Option<f64>,
    /// Line voltage in volts.
    pub volts: Option<f64>,
    /// Line current in amps.
    pub amps: Option<f64>,
    /// Appliance temperature in degrees Celsius.
    pub temp_c: Option<f64>,
    /// Probe pressure value.
    pub pressure: Option<f64>,
    /// Opaque source payload.
    pub raw: serde_json::Value,
}

#[derive(Debug)]
struct CollectorSession {
    shutdown: watch::Sender<bool>,
    collected: Arc<AtomicUsize>,
}

/// Registry of per-run polling tasks.
pub struct ReadingsCollector {
    store: Arc<dyn RunStore>,
    sessions: Mutex<HashMap<RunId, CollectorSession>>,
}

impl ReadingsCollector {
    /// Create a collector writing through `store`.
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Begin polling `adapter` for `run_id` every `interval`.
    ///
    /// Rejects with [`CollectorError::AlreadyCollecting`] when a session
    /// for the run exists; the original session keeps running.
    pub fn start(
        &self,
        run_id: RunId,
        station: Station,
        outlet: Outlet,
        adapter: Arc<dyn PowerController>,
        interval: Duration,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&run_id) {
            return Err(CollectorError::AlreadyCollecting(run_id));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let collected = Arc::new(AtomicUsize::new(0));
        let session = CollectorSession {
            shutdown: shutdown_tx,
            collected: collected.clone(),
        };

        let store = self.store.clone();
        tokio::spawn(poll_loop(
            run_id, station, outlet, adapter, store, interval, shutdown_rx, collected,
        ));

        sessions.insert(run_id, session);
        debug!(run_id = %run_id, interval_ms = interval.as_millis() as u64, "collection started");
        Ok(())
    }

    /// Stop collecting for `run_id` and return the number of readings
    /// persisted by this session. Idempotent: returns 0 when nothing
    /// was active.
    pub fn stop(&self, run_id: RunId) -> usize {
        let session = self.sessions.lock().remove(&run_id);
        match session {
            Some(session) => {
                // The watch flag flips before this call returns, so an
                // in-flight poll observes it and discards its sample.
                let _ = session.shutdown.send(true);
                let count = session.collected.load(Ordering::Acquire);
                debug!(run_id = %run_id, readings = count, "collection stopped");
                count
            }
            None => 0,
        }
    }

    /// Stop every active session; used on process shutdown.
    pub fn stop_all(&self) {
        let run_ids: Vec<RunId> = self.sessions.lock().keys().copied().collect();
        for run_id in run_ids {
            self.stop(run_id);
        }
    }

    /// Whether a session is active for `run_id`.
    pub fn is_collecting(&self, run_id: RunId) -> bool {
        self.sessions.lock().contains_key(&run_id)
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Most recent persisted reading for the run.
    pub fn latest_reading(&self, run_id: RunId) -> Option<Reading> {
        self.store.latest_reading(run_id)
    }

    /// Persisted readings, most-recent-first, optionally limited.
    pub fn readings(&self, run_id: RunId, limit: Option<usize>) -> Vec<Reading> {
        self.store.readings(run_id, limit)
    }

    /// Persist a sample from a source the collector cannot poll.
    pub fn record_reading(&self, run_id: RunId, sample: ExternalSample) -> Result<()> {
        self.store.insert_reading(Reading {
            run_id,
            timestamp: Utc::now(),
            watts: sample.watts,
            volts: sample.volts,
            amps: sample.amps,
            temp_c: sample.temp_c,
            pressure: sample.pressure,
            raw: sample.raw,
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for ReadingsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingsCollector")
            .field("active", &self.sessions.lock().len())
            .finish()
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_loop(
    run_id: RunId,
    station: Station,
    outlet: Outlet,
    adapter: Arc<dyn PowerController>,
    store: Arc<dyn RunStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    collected: Arc<AtomicUsize>,
) {
    let mut ticker = tokio::time::interval(interval);
    // A poll slower than the interval must skip the missed ticks, not
    // queue a burst of catch-up calls against the same outlet.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(run_id = %run_id, "collector shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                match adapter.instant_readings(&station, &outlet).await {
                    Ok(sample) => {
                        if *shutdown.borrow() {
                            debug!(run_id = %run_id, "discarding sample for stopped run");
                            break;
                        }
                        persist_sample(&*store, run_id, sample, &collected);
                    }
                    Err(err) => {
                        // One bad tick never stops collection; the next
                        // scheduled tick is the retry.
                        warn!(run_id = %run_id, station = %station.id,
                            channel = outlet.channel, error = %err,
                            "poll failed; will retry on next tick");
                    }
                }
            }
        }
    }
}

fn persist_sample(
    store: &dyn RunStore,
    run_id: RunId,
    sample: InstantReading,
    collected: &AtomicUsize,
) {
    let reading = Reading {
        run_id,
        timestamp: Utc::now(),
        watts: sample.watts,
        volts: sample.volts,
        amps: sample.amps,
        temp_c: None,
        pressure: None,
        raw: sample.raw,
    };
    match store.insert_reading(reading) {
        Ok(()) => {
            collected.fetch_add(1, Ordering::AcqRel);
        }
        Err(err) => {
            error!(run_id = %run_id, error = %err, "failed to persist reading");
        }
    }
}
