//! ---
//! ate_section: "15-testing-qa-runbook"
//! ate_subsection: "integration-tests"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Threshold and shutdown scenarios across collector, monitor, and store."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use ate_collector::ReadingsCollector;
use ate_common::config::ControllerType;
use ate_controllers::{HealthReport, InstantReading, PowerController};
use ate_safety::{MonitorTiming, SafetyMonitor};
use ate_storage::{
    AnomalyKind, MemoryRunStore, Outlet, Profile, Reading, Run, RunId, RunStatus, RunStore,
    SafetyFlags, Station,
};

/// Relay stand-in that counts switching and answers a scripted health
/// state; metering samples are injected straight into the store.
#[derive(Debug)]
struct ScriptedRelay {
    on_count: AtomicUsize,
    off_count: AtomicUsize,
    healthy: AtomicBool,
}

impl ScriptedRelay {
    fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            on_count: AtomicUsize::new(0),
            off_count: AtomicUsize::new(0),
            healthy: AtomicBool::new(healthy),
        })
    }
}

#[async_trait]
impl PowerController for ScriptedRelay {
    fn controller_type(&self) -> ControllerType {
        ControllerType::Relay
    }

    async fn turn_on(&self, _station: &Station, _outlet: &Outlet) -> ate_controllers::Result<()> {
        self.on_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn turn_off(&self, _station: &Station, _outlet: &Outlet) {
        self.off_count.fetch_add(1, Ordering::AcqRel);
    }

    async fn instant_readings(
        &self,
        _station: &Station,
        _outlet: &Outlet,
    ) -> ate_controllers::Result<InstantReading> {
        Ok(InstantReading::empty(json!({ "scripted": true })))
    }

    async fn health_check(&self, _station: &Station) -> HealthReport {
        if self.healthy.load(Ordering::Acquire) {
            HealthReport::healthy("scripted relay ok")
        } else {
            HealthReport::failed("scripted relay lost contact")
        }
    }
}

struct Rig {
    store: Arc<MemoryRunStore>,
    monitor: SafetyMonitor,
    run_id: RunId,
}

fn rig(spike_shutdown_watts: f64, max_amps: Option<f64>, adapter: Arc<ScriptedRelay>) -> Rig {
    let store = Arc::new(MemoryRunStore::new());
    let collector = Arc::new(ReadingsCollector::new(store.clone()));
    let monitor = SafetyMonitor::new(store.clone(), collector, MonitorTiming::default());

    let run = Run::new("bench-a", 0, "profile-x");
    let run_id = run.id;
    store.create_run(run).unwrap();
    store.update_status(run_id, RunStatus::InProgress).unwrap();

    let station = Station {
        id: "bench-a".to_owned(),
        name: "Bench A".to_owned(),
        controller: ControllerType::Relay,
        address: Some("http://10.1.0.10".to_owned()),
        snmp_community: "private".to_owned(),
        safety: SafetyFlags {
            gfci_present: true,
            acknowledged_by: Some("op-1".to_owned()),
        },
    };
    let outlet = Outlet {
        station_id: station.id.clone(),
        channel: 0,
        label: "left".to_owned(),
        enabled: true,
        supports_on_off: true,
        max_amps,
    };
    let profile = Profile {
        id: "profile-x".to_owned(),
        category: "vacuum".to_owned(),
        max_peak_watts: 1800.0,
        min_stable_watts: 300.0,
        max_stable_watts: 1400.0,
        spike_shutdown_watts,
        min_run_seconds: 30,
        checklist: Vec::new(),
    };

    monitor.start_monitoring(run_id, station, outlet, profile, adapter);
    Rig {
        store,
        monitor,
        run_id,
    }
}

fn sample(run_id: RunId, watts: f64, amps: f64) -> Reading {
    Reading {
        run_id,
        timestamp: Utc::now(),
        watts: Some(watts),
        volts: Some(120.0),
        amps: Some(amps),
        temp_c: None,
        pressure: None,
        raw: json!({}),
    }
}

/// 2100 W sampled at t = 0, 100, 200, and 300 ms against a 2000 W
/// shutdown threshold: exactly one shutdown, one turn-off, one SPIKE
/// anomaly, and the run ends ABORTED.
#[tokio::test(start_paused = true)]
async fn sustained_spike_timeline_aborts_once() {
    let relay = ScriptedRelay::new(true);
    let rig = rig(2000.0, Some(15.0), relay.clone());

    rig.store.insert_reading(sample(rig.run_id, 2100.0, 9.0)).unwrap();
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        rig.store.insert_reading(sample(rig.run_id, 2100.0, 9.0)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let run = rig.store.get_run(rig.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
    assert_eq!(run.anomalies.len(), 1);
    assert_eq!(run.anomalies[0].kind, AnomalyKind::Spike);
    assert_eq!(run.anomalies[0].observed, Some(2100.0));
    assert_eq!(run.anomalies[0].threshold, Some(2000.0));
    assert_eq!(relay.off_count.load(Ordering::Acquire), 1);
    assert!(!rig.monitor.is_monitored(rig.run_id));
}

/// A spike that lasts 240 ms and then drops below threshold never
/// trips shutdown.
#[tokio::test(start_paused = true)]
async fn spike_shorter_than_debounce_never_fires() {
    let relay = ScriptedRelay::new(true);
    let rig = rig(2000.0, Some(15.0), relay.clone());

    rig.store.insert_reading(sample(rig.run_id, 2100.0, 9.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(240)).await;
    rig.store.insert_reading(sample(rig.run_id, 350.0, 2.9)).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let run = rig.store.get_run(rig.run_id).unwrap();
    assert_eq!(run.status, RunStatus::InProgress);
    assert!(run.anomalies.is_empty());
    assert_eq!(relay.off_count.load(Ordering::Acquire), 0);
    rig.monitor.stop_all();
}

/// One sample at 16 A against a 15 A outlet ceiling aborts on the very
/// next reading check, with no debounce.
#[tokio::test(start_paused = true)]
async fn overcurrent_sample_aborts_on_next_check() {
    let relay = ScriptedRelay::new(true);
    let rig = rig(2000.0, Some(15.0), relay.clone());

    rig.store.insert_reading(sample(rig.run_id, 1100.0, 16.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let run = rig.store.get_run(rig.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
    assert_eq!(run.anomalies.len(), 1);
    assert_eq!(run.anomalies[0].kind, AnomalyKind::Overcurrent);
    assert_eq!(run.anomalies[0].observed, Some(16.0));
    assert_eq!(run.anomalies[0].threshold, Some(15.0));
    assert_eq!(relay.off_count.load(Ordering::Acquire), 1);
}

/// A failed controller health probe aborts independently of any
/// reading-based condition; no readings exist at all here.
#[tokio::test(start_paused = true)]
async fn health_failure_aborts_without_readings() {
    let relay = ScriptedRelay::new(false);
    let rig = rig(2000.0, Some(15.0), relay.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let run = rig.store.get_run(rig.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
    assert_eq!(run.anomalies.len(), 1);
    assert_eq!(run.anomalies[0].kind, AnomalyKind::HealthFail);
    assert!(run.anomalies[0].message.contains("lost contact"));
    assert_eq!(relay.off_count.load(Ordering::Acquire), 1);
}

/// Stopping the monitor first wins the race: a violation that lands
/// afterwards is never evaluated and nothing is de-energized twice.
#[tokio::test(start_paused = true)]
async fn stop_beats_late_violation() {
    let relay = ScriptedRelay::new(true);
    let rig = rig(2000.0, Some(15.0), relay.clone());

    rig.monitor.stop_monitoring(rig.run_id);
    rig.store.insert_reading(sample(rig.run_id, 9999.0, 80.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    let run = rig.store.get_run(rig.run_id).unwrap();
    assert_eq!(run.status, RunStatus::InProgress);
    assert!(run.anomalies.is_empty());
    assert_eq!(relay.off_count.load(Ordering::Acquire), 0);
}
