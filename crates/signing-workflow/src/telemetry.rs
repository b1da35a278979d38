//! Workflow counters
//!
//! No-ops unless the embedding process installs a `metrics` recorder.

/// Record a finished workflow run (`done` or the failing stage).
pub fn record_run(outcome: &'static str) {
    metrics::counter!("signing_workflow_runs_total", "outcome" => outcome).increment(1);
}

/// Record a token fetched from the provider (cache miss).
pub fn record_token_refresh() {
    metrics::counter!("signing_token_refreshes_total").increment(1);
}
