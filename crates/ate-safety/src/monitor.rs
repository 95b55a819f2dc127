//! ---
//! ate_section: "05-safety-monitoring"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Safety precondition checks and threshold monitoring."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use ate_collector::ReadingsCollector;
use ate_common::config::BenchConfig;
use ate_common::time::{duration_to_millis, monotonic_now};
use ate_controllers::PowerController;
use ate_storage::{Anomaly, Outlet, Profile, RunId, RunStatus, RunStore, Station};

/// Check cadences and the spike debounce window.
#[derive(Debug, Clone, Copy)]
pub struct MonitorTiming {
    /// Reading-check cadence.
    pub reading_check: Duration,
    /// Controller health-check cadence.
    pub health_check: Duration,
    /// How long a spike must hold before shutdown fires.
    pub spike_debounce: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            reading_check: Duration::from_millis(250),
            health_check: Duration::from_secs(30),
            spike_debounce: Duration::from_millis(250),
        }
    }
}

impl From<&BenchConfig> for MonitorTiming {
    fn from(bench: &BenchConfig) -> Self {
        Self {
            reading_check: bench.reading_check_interval,
            health_check: bench.health_check_interval,
            spike_debounce: bench.spike_debounce,
        }
    }
}

struct MonitorSession {
    station: Station,
    outlet: Outlet,
    profile: Profile,
    adapter: Arc<dyn PowerController>,
    shutdown: watch::Sender<bool>,
    /// First shutdown trigger wins; the loser returns without side effects.
    claimed: AtomicBool,
}

struct MonitorInner {
    store: Arc<dyn RunStore>,
    collector: Arc<ReadingsCollector>,
    timing: MonitorTiming,
    sessions: Mutex<HashMap<RunId, Arc<MonitorSession>>>,
}

impl MonitorInner {
    fn remove_session(&self, run_id: RunId) -> bool {
        match self.sessions.lock().remove(&run_id) {
            Some(session) => {
                let _ = session.shutdown.send(true);
                true
            }
            None => false,
        }
    }
}

/// Registry of per-run safety monitoring tasks.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SafetyMonitor {
    inner: Arc<MonitorInner>,
}

impl SafetyMonitor {
    /// Create a monitor reading through `store` and stopping `collector`
    /// on emergency shutdown.
    pub fn new(
        store: Arc<dyn RunStore>,
        collector: Arc<ReadingsCollector>,
        timing: MonitorTiming,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                store,
                collector,
                timing,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register the run and spawn its reading and health check tasks.
    ///
    /// A run that is already monitored is left untouched.
    pub fn start_monitoring(
        &self,
        run_id: RunId,
        station: Station,
        outlet: Outlet,
        profile: Profile,
        adapter: Arc<dyn PowerController>,
    ) {
        let mut sessions = self.inner.sessions.lock();
        if sessions.contains_key(&run_id) {
            debug!(run_id = %run_id, "already monitored; start ignored");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = Arc::new(MonitorSession {
            station,
            outlet,
            profile,
            adapter,
            shutdown: shutdown_tx,
            claimed: AtomicBool::new(false),
        });
        sessions.insert(run_id, session.clone());
        drop(sessions);

        tokio::spawn(reading_check_loop(
            self.inner.clone(),
            run_id,
            session.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(health_check_loop(
            self.inner.clone(),
            run_id,
            session,
            shutdown_rx,
        ));
        debug!(run_id = %run_id,
            reading_check_ms = self.inner.timing.reading_check.as_millis() as u64,
            health_check_s = self.inner.timing.health_check.as_secs(),
            "safety monitoring started");
    }

    /// Cancel both check tasks and deregister the run. Idempotent.
    pub fn stop_monitoring(&self, run_id: RunId) {
        if self.inner.remove_session(run_id) {
            debug!(run_id = %run_id, "safety monitoring stopped");
        }
    }

    /// Drain every monitored run; used on process shutdown.
    pub fn stop_all(&self) {
        let run_ids: Vec<RunId> = self.inner.sessions.lock().keys().copied().collect();
        for run_id in run_ids {
            self.stop_monitoring(run_id);
        }
    }

    /// Whether the run is currently monitored.
    pub fn is_monitored(&self, run_id: RunId) -> bool {
        self.inner.sessions.lock().contains_key(&run_id)
    }

    /// Number of monitored runs.
    pub fn monitored_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }
}

impl std::fmt::Debug for SafetyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyMonitor")
            .field("monitored", &self.inner.sessions.lock().len())
            .finish()
    }
}

async fn reading_check_loop(
    inner: Arc<MonitorInner>,
    run_id: RunId,
    session: Arc<MonitorSession>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(inner.timing.reading_check);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut spike_since: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(run_id = %run_id, "reading check cancelled");
                break;
            }
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                if let Some(anomaly) =
                    evaluate_latest_reading(&inner, run_id, &session, &mut spike_since)
                {
                    emergency_shutdown(&inner, run_id, anomaly).await;
                    break;
                }
            }
        }
    }
}

/// Evaluate the latest persisted reading against the run's thresholds.
///
/// Never polls the controller itself; the collector's writes are the
/// only input. Returns the anomaly that warrants shutdown, if any.
fn evaluate_latest_reading(
    inner: &MonitorInner,
    run_id: RunId,
    session: &MonitorSession,
    spike_since: &mut Option<Instant>,
) -> Option<Anomaly> {
    let reading = inner.store.latest_reading(run_id)?;

    // Overcurrent has no debounce: one bad sample is enough.
    if let (Some(amps), Some(max_amps)) = (reading.amps, session.outlet.max_amps) {
        if amps > max_amps {
            return Some(Anomaly::overcurrent(amps, max_amps));
        }
    }

    if let Some(watts) = reading.watts {
        if watts >= session.profile.spike_shutdown_watts {
            let since = *spike_since.get_or_insert_with(monotonic_now);
            let held = since.elapsed();
            if held >= inner.timing.spike_debounce {
                return Some(Anomaly::spike(
                    watts,
                    session.profile.spike_shutdown_watts,
                    duration_to_millis(held),
                ));
            }
        } else {
            // Any dip below threshold resets the window entirely; there
            // is no cumulative debounce across gaps.
            *spike_since = None;
        }
    }
    None
}

async fn health_check_loop(
    inner: Arc<MonitorInner>,
    run_id: RunId,
    session: Arc<MonitorSession>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(inner.timing.health_check);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(run_id = %run_id, "health check cancelled");
                break;
            }
            _ = ticker.tick() => {
                let report = session.adapter.health_check(&session.station).await;
                if *shutdown.borrow() {
                    debug!(run_id = %run_id, "discarding health result for stopped run");
                    break;
                }
                if !report.ok {
                    warn!(run_id = %run_id, details = %report.details, "controller health check failed");
                    emergency_shutdown(&inner, run_id, Anomaly::health_fail(&report.details))
                        .await;
                    break;
                }
            }
        }
    }
}

/// Fixed-order emergency shutdown.
///
/// Exits immediately when the run is no longer registered (the trigger
/// raced a prior stop). Every later step is best-effort: a partial
/// failure is logged and the remaining steps still execute.
async fn emergency_shutdown(inner: &MonitorInner, run_id: RunId, anomaly: Anomaly) {
    let Some(session) = inner.sessions.lock().get(&run_id).cloned() else {
        debug!(run_id = %run_id, "shutdown skipped; run no longer monitored");
        return;
    };
    if session.claimed.swap(true, Ordering::AcqRel) {
        return;
    }

    error!(run_id = %run_id, kind = %anomaly.kind, message = %anomaly.message,
        "emergency shutdown initiated");

    // 1. De-energize. Never raises by contract.
    session
        .adapter
        .turn_off(&session.station, &session.outlet)
        .await;

    // 2. Halt collection for this run.
    let readings = inner.collector.stop(run_id);
    debug!(run_id = %run_id, readings, "collection halted by shutdown");

    // 3. Record what tripped.
    if let Err(err) = inner.store.add_anomaly(run_id, anomaly) {
        error!(run_id = %run_id, error = %err, "failed to record anomaly");
    }

    // 4. Mark the run aborted. Absorbed silently if the run already
    // reached a terminal status through its own completion path.
    if let Err(err) = inner.store.update_status(run_id, RunStatus::Aborted) {
        error!(run_id = %run_id, error = %err, "failed to mark run aborted");
    }

    // 5. Cancel both check tasks and deregister.
    inner.remove_session(run_id);
}
