//! ---
//! ate_section: "15-testing-qa-runbook"
//! ate_subsection: "integration-tests"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run lifecycle scenarios through the full bench wiring."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use ate_common::config::{BenchConfig, ControllerType};
use ate_core::TestBench;
use ate_storage::{
    AnomalyKind, BenchJournal, JournaledStore, MemoryRunStore, Outlet, Profile, Reading, RunId,
    RunStatus, RunStore, SafetyFlags, Station,
};

fn manual_station(id: &str) -> Station {
    Station {
        id: id.to_owned(),
        name: format!("Station {id}"),
        controller: ControllerType::Manual,
        address: None,
        snmp_community: "private".to_owned(),
        safety: SafetyFlags {
            gfci_present: true,
            acknowledged_by: Some("op-5".to_owned()),
        },
    }
}

fn outlet(station_id: &str, channel: u16, max_amps: Option<f64>) -> Outlet {
    Outlet {
        station_id: station_id.to_owned(),
        channel,
        label: format!("ch-{channel}"),
        enabled: true,
        supports_on_off: false,
        max_amps,
    }
}

fn profile() -> Profile {
    Profile {
        id: "vacuum".to_owned(),
        category: "vacuum".to_owned(),
        max_peak_watts: 1800.0,
        min_stable_watts: 300.0,
        max_stable_watts: 1400.0,
        spike_shutdown_watts: 2000.0,
        min_run_seconds: 30,
        checklist: vec!["inspect cord".to_owned()],
    }
}

fn overcurrent_sample(run_id: RunId, amps: f64) -> Reading {
    Reading {
        run_id,
        timestamp: Utc::now(),
        watts: Some(1100.0),
        volts: Some(120.0),
        amps: Some(amps),
        temp_c: None,
        pressure: None,
        raw: json!({ "source": "probe-cart" }),
    }
}

#[tokio::test(start_paused = true)]
async fn emergency_shutdown_wins_race_with_operator_stop() {
    let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
    let bench = TestBench::new(BenchConfig::default(), store.clone());

    let station = manual_station("bench-m");
    let outlet = outlet("bench-m", 0, Some(15.0));
    let run_id = bench.start_run(&station, &outlet, &profile()).await.unwrap();

    // Let the collector take its first (empty) manual sample, then land
    // an overcurrent reading from the probe cart.
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.insert_reading(overcurrent_sample(run_id, 16.2)).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let run = store.get_run(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
    assert_eq!(run.anomalies.len(), 1);
    assert_eq!(run.anomalies[0].kind, AnomalyKind::Overcurrent);
    assert!(!bench.collector().is_collecting(run_id));
    assert!(!bench.monitor().is_monitored(run_id));

    // Operator stop arrives after the abort: absorbed, not an error.
    let readings = bench.stop_run(run_id, RunStatus::Completed).await.unwrap();
    assert_eq!(readings, 0);
    assert_eq!(store.get_run(run_id).unwrap().status, RunStatus::Aborted);
}

#[tokio::test(start_paused = true)]
async fn journal_captures_the_whole_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let store: Arc<dyn RunStore> = Arc::new(JournaledStore::new(
        Arc::new(MemoryRunStore::new()),
        BenchJournal::open(&path).unwrap(),
    ));
    let bench = TestBench::new(BenchConfig::default(), store.clone());

    let station = manual_station("bench-m");
    let outlet = outlet("bench-m", 1, Some(15.0));
    let run_id = bench.start_run(&station, &outlet, &profile()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    store.insert_reading(overcurrent_sample(run_id, 17.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let entries = BenchJournal::replay(&path).unwrap();
    let events: Vec<&str> = entries.iter().map(|entry| entry.event.as_str()).collect();
    assert_eq!(events, vec!["created", "status", "anomaly", "status"]);
    assert!(entries.iter().all(|entry| entry.run_id == run_id));
    let sequences: Vec<u64> = entries.iter().map(|entry| entry.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert_eq!(entries[3].payload["status"], "ABORTED");
}

#[tokio::test(start_paused = true)]
async fn outlet_stays_exclusive_until_terminal() {
    let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
    let bench = TestBench::new(BenchConfig::default(), store.clone());

    let station = manual_station("bench-m");
    let shared = outlet("bench-m", 2, None);
    let other = outlet("bench-m", 3, None);

    let first = bench.start_run(&station, &shared, &profile()).await.unwrap();
    // Same outlet: rejected. A different channel on the same station is fine.
    assert!(bench.start_run(&station, &shared, &profile()).await.is_err());
    let second = bench.start_run(&station, &other, &profile()).await.unwrap();

    bench.stop_run(first, RunStatus::Completed).await.unwrap();
    let third = bench.start_run(&station, &shared, &profile()).await.unwrap();

    assert_eq!(bench.collector().active_count(), 2);
    assert_eq!(bench.monitor().monitored_count(), 2);

    bench.shutdown();
    assert_eq!(bench.collector().active_count(), 0);
    assert_eq!(bench.monitor().monitored_count(), 0);
    for run_id in [second, third] {
        assert!(!bench.collector().is_collecting(run_id));
    }
}
