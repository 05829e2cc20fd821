//! Prometheus metrics for access-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};

/// Validation attempts by outcome and deny reason ("none" when allowed).
pub static VALIDATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "access_validations_total",
        "Total number of checkpoint validations",
        &["action", "outcome", "reason"]
    )
    .expect("Failed to register validations_total")
});

/// Validation latency, PIN hashing included.
pub static VALIDATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "access_validation_duration_seconds",
        "Checkpoint validation duration in seconds",
        &["kind"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register validation_duration")
});

pub static CREDENTIALS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "access_credentials_issued_total",
        "Total number of credentials issued",
        &["kind"]
    )
    .expect("Failed to register credentials_issued")
});

pub static CREDENTIALS_REVOKED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "access_credentials_revoked_total",
        "Total number of credential revocations that changed state"
    )
    .expect("Failed to register credentials_revoked")
});

pub static LEDGER_EVICTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "access_ledger_evictions_total",
        "Events dropped from the access ledger at capacity"
    )
    .expect("Failed to register ledger_evictions")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "access_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&VALIDATIONS_TOTAL);
    Lazy::force(&VALIDATION_DURATION);
    Lazy::force(&CREDENTIALS_ISSUED);
    Lazy::force(&CREDENTIALS_REVOKED);
    Lazy::force(&LEDGER_EVICTIONS);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
