//! Prometheus metrics for the simulation core.
//!
//! Registered in the default registry on first use; `init` forces
//! registration so every series shows up in `/metrics` before traffic.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};

pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("sattrain_active_sessions", "Sessions with a live simulator").unwrap();
    prometheus::register(Box::new(g.clone())).unwrap();
    g
});

pub static SESSIONS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("sattrain_sessions_finished_total", "Sessions ended, by final status"),
        &["status"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static COMMANDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("sattrain_commands_total", "Operator commands applied, by result status"),
        &["status"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALIES_INJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("sattrain_anomalies_injected_total", "Anomalies injected, by type"),
        &["kind"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALIES_RESOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "sattrain_anomalies_resolved_total",
            "Anomalies resolved by corrective command, by type",
        ),
        &["kind"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALIES_EXPIRED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("sattrain_anomalies_expired_total", "Anomalies that reached their TTL, by type"),
        &["kind"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static EVENTS_EMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("sattrain_events_emitted_total", "Events pushed to session rooms, by name"),
        &["event"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static TICK_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "sattrain_tick_duration_seconds",
        "Wall time spent applying one simulation tick",
    ))
    .unwrap();
    prometheus::register(Box::new(h.clone())).unwrap();
    h
});

pub static SNAPSHOT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "sattrain_snapshot_failures_total",
        "Snapshots the store refused or failed to write",
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

/// Force registration of every metric.
pub fn init() {
    let _ = &*ACTIVE_SESSIONS;
    let _ = &*SESSIONS_FINISHED;
    let _ = &*COMMANDS_TOTAL;
    let _ = &*ANOMALIES_INJECTED;
    let _ = &*ANOMALIES_RESOLVED;
    let _ = &*ANOMALIES_EXPIRED;
    let _ = &*EVENTS_EMITTED;
    let _ = &*TICK_LATENCY;
    let _ = &*SNAPSHOT_FAILURES;
}
