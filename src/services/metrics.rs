//! Prometheus metrics for sync runs, gathered by `GET /metrics`

use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

use crate::models::{SourceKind, SyncResult, SyncStatus};

lazy_static! {
    static ref SYNC_RUNS: IntCounterVec = register_int_counter_vec!(
        "sync_runs_total",
        "Finished sync runs by source kind and outcome",
        &["kind", "status"]
    )
    .unwrap();
    static ref SYNC_WARNINGS: IntCounterVec = register_int_counter_vec!(
        "sync_entry_warnings_total",
        "Per-entry warnings raised during sync",
        &["kind"]
    )
    .unwrap();
    static ref SYNC_DURATION: HistogramVec = register_histogram_vec!(
        "sync_duration_seconds",
        "Wall time of a sync run",
        &["kind"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap();
}

/// Records one finished run
pub fn record_sync(kind: SourceKind, result: &SyncResult) {
    let kind = kind.to_string();
    let status = match &result.status {
        SyncStatus::Completed => "completed",
        SyncStatus::Failed { kind, .. } => kind.as_str(),
    };

    SYNC_RUNS.with_label_values(&[kind.as_str(), status]).inc();
    SYNC_WARNINGS
        .with_label_values(&[&kind])
        .inc_by(result.warnings.len() as u64);

    let elapsed = result.finished_at - result.started_at;
    let seconds = elapsed.num_milliseconds().max(0) as f64 / 1000.0;
    SYNC_DURATION.with_label_values(&[&kind]).observe(seconds);
}
