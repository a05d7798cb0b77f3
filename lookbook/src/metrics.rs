//! Prometheus metrics for generations, credits and upstream calls.
//!
//! Metrics are registered lazily in the default registry and rendered as text by
//! [`render`] at `/internal/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounterVec, TextEncoder, register_histogram, register_int_counter_vec,
};

/// Generations reaching a terminal status
static GENERATIONS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lookbook_generations_finished_total",
        "Generations that reached a terminal status",
        &["status", "reason"]
    )
    .expect("Failed to register lookbook_generations_finished_total metric")
});

/// Ledger movements, by kind and outcome
static CREDIT_LEDGER_ENTRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lookbook_credit_ledger_entries_total",
        "Credit ledger operations by kind and outcome",
        &["kind", "outcome"]
    )
    .expect("Failed to register lookbook_credit_ledger_entries_total metric")
});

/// Wall time from prediction creation to terminal state
/// Buckets: 1s, 2s, 5s, 10s, 20s, 30s, 60s, 90s, 120s, 300s
static PREDICTION_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "lookbook_prediction_duration_seconds",
        "Time from prediction creation until a terminal state was observed (seconds)",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0, 300.0]
    )
    .expect("Failed to register lookbook_prediction_duration_seconds metric")
});

/// Prompt enhancement results, by source (`model` or `fallback`)
static PROMPT_ENHANCEMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lookbook_prompt_enhancements_total",
        "Prompt enhancements by provider and source of the final prompt",
        &["provider", "source"]
    )
    .expect("Failed to register lookbook_prompt_enhancements_total metric")
});

pub fn record_generation_finished(status: &str, reason: &str) {
    GENERATIONS_FINISHED.with_label_values(&[status, reason]).inc();
}

pub fn record_ledger_entry(kind: &str, outcome: &str) {
    CREDIT_LEDGER_ENTRIES.with_label_values(&[kind, outcome]).inc();
}

pub fn record_prediction_duration(seconds: f64) {
    PREDICTION_DURATION_SECONDS.observe(seconds);
}

pub fn record_prompt_enhancement(provider: &str, source: &str) {
    PROMPT_ENHANCEMENTS.with_label_values(&[provider, source]).inc();
}

/// Render every metric in the default registry in the Prometheus text format
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
