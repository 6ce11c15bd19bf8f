//! Reconciliation metrics

use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static::lazy_static! {
    /// Shipments by outcome
    pub static ref SHIPMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "freight_reconcile_shipments_total",
        "Shipments handled by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Fetch failures by error kind
    pub static ref FETCH_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "freight_reconcile_fetch_failures_total",
        "Failed shipment page fetches",
        &["kind"]
    )
    .unwrap();

    /// Batch wall time
    pub static ref BATCH_DURATION: HistogramVec = register_histogram_vec!(
        "freight_reconcile_batch_duration_seconds",
        "Duration of one reconciliation batch",
        &["org_id"]
    )
    .unwrap();
}
