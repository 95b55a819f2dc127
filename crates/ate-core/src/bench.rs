//! ---
//! ate_section: "01-core-functionality"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run lifecycle orchestration for the bench runtime."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use ate_collector::{CollectorError, ReadingsCollector};
use ate_common::config::BenchConfig;
use ate_controllers::{controller_for, ControllerError, PowerController};
use ate_safety::{validate_safety, MonitorTiming, SafetyMonitor, SafetyViolation};
use ate_storage::{Outlet, Profile, Run, RunId, RunStatus, RunStore, Station, StorageError};

/// Result alias for bench lifecycle operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Error type for starting and stopping runs.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Safety preconditions block energizing; the run was not created.
    #[error("safety preconditions violated: {}", format_violations(.0))]
    Unsafe(Vec<SafetyViolation>),
    /// Controller construction failed (bad type/address configuration).
    #[error(transparent)]
    Controller(#[from] ControllerError),
    /// Turn-on failed; the run was created and immediately aborted.
    #[error("failed to energize outlet: {0}")]
    Energize(#[source] ControllerError),
    /// Collector registry rejected the session.
    #[error(transparent)]
    Collector(#[from] CollectorError),
    /// Storage failure (unknown run, contested outlet).
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// `stop_run` was handed a non-terminal outcome.
    #[error("stop outcome {0} is not a terminal status")]
    NonTerminalOutcome(RunStatus),
}

fn format_violations(violations: &[SafetyViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

struct ActiveRun {
    station: Station,
    outlet: Outlet,
    adapter: Arc<dyn PowerController>,
}

/// Owns the collector and safety monitor and wires both to a run's
/// controller for the duration of the run.
pub struct TestBench {
    bench: BenchConfig,
    store: Arc<dyn RunStore>,
    collector: Arc<ReadingsCollector>,
    monitor: SafetyMonitor,
    active: Mutex<HashMap<RunId, ActiveRun>>,
}

impl TestBench {
    /// Build the bench around `store` using the configured cadences.
    pub fn new(bench: BenchConfig, store: Arc<dyn RunStore>) -> Self {
        let collector = Arc::new(ReadingsCollector::new(store.clone()));
        let monitor = SafetyMonitor::new(
            store.clone(),
            collector.clone(),
            MonitorTiming::from(&bench),
        );
        Self {
            bench,
            store,
            collector,
            monitor,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start a test run: validate preconditions, build the controller,
    /// claim the outlet, energize, then begin collection and monitoring.
    ///
    /// Configuration problems surface before anything is energized. A
    /// turn-on failure aborts the freshly created run and releases the
    /// outlet claim.
    pub async fn start_run(
        &self,
        station: &Station,
        outlet: &Outlet,
        profile: &Profile,
    ) -> Result<RunId> {
        let violations = validate_safety(station, outlet);
        if !violations.is_empty() {
            return Err(BenchError::Unsafe(violations));
        }

        let adapter = controller_for(station, &self.bench)?;

        let run = Run::new(&station.id, outlet.channel, &profile.id);
        let run_id = run.id;
        self.store.create_run(run)?;

        if let Err(err) = self.store.claim_outlet(&station.id, outlet.channel, run_id) {
            let _ = self.store.update_status(run_id, RunStatus::Aborted);
            return Err(err.into());
        }

        if let Err(err) = adapter.turn_on(station, outlet).await {
            warn!(run_id = %run_id, station = %station.id, channel = outlet.channel,
                error = %err, "turn-on failed; aborting run before collection");
            self.store
                .release_outlet(&station.id, outlet.channel, run_id);
            let _ = self.store.update_status(run_id, RunStatus::Aborted);
            return Err(BenchError::Energize(err));
        }

        self.store.update_status(run_id, RunStatus::InProgress)?;

        self.collector.start(
            run_id,
            station.clone(),
            outlet.clone(),
            adapter.clone(),
            self.bench.collect_interval,
        )?;
        self.monitor.start_monitoring(
            run_id,
            station.clone(),
            outlet.clone(),
            profile.clone(),
            adapter.clone(),
        );

        self.active.lock().insert(
            run_id,
            ActiveRun {
                station: station.clone(),
                outlet: outlet.clone(),
                adapter,
            },
        );

        info!(run_id = %run_id, station = %station.id, channel = outlet.channel,
            profile = %profile.id, "run started");
        Ok(run_id)
    }

    /// Operator stop: halt monitoring and collection, de-energize, and
    /// record the terminal `outcome`.
    ///
    /// Safe to race an emergency shutdown; the terminal status written
    /// first wins and the later write is absorbed. Returns the number
    /// of readings the stopped collection session had persisted.
    pub async fn stop_run(&self, run_id: RunId, outcome: RunStatus) -> Result<usize> {
        if !outcome.is_terminal() {
            return Err(BenchError::NonTerminalOutcome(outcome));
        }

        self.monitor.stop_monitoring(run_id);
        let readings = self.collector.stop(run_id);

        if let Some(active) = self.active.lock().remove(&run_id) {
            active
                .adapter
                .turn_off(&active.station, &active.outlet)
                .await;
            self.store
                .release_outlet(&active.station.id, active.outlet.channel, run_id);
        }

        let effective = self.store.update_status(run_id, outcome)?;
        info!(run_id = %run_id, requested = %outcome, effective = %effective,
            readings, "run stopped");
        Ok(readings)
    }

    /// Drain every active run's tasks; used on process shutdown.
    ///
    /// Outlets are left in their current state: a drain is not an
    /// emergency, and cutting power to a mid-test appliance is an
    /// operator decision.
    pub fn shutdown(&self) {
        let active = self.active.lock().len();
        info!(active, "draining bench");
        self.monitor.stop_all();
        self.collector.stop_all();
        self.active.lock().clear();
    }

    /// The readings collector (query surface for latest/history).
    pub fn collector(&self) -> &Arc<ReadingsCollector> {
        &self.collector
    }

    /// The safety monitor registry.
    pub fn monitor(&self) -> &SafetyMonitor {
        &self.monitor
    }

    /// The underlying run store.
    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }
}

impl std::fmt::Debug for TestBench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestBench")
            .field("active", &self.active.lock().len())
            .finish()
    }
}
