//! Prometheus metrics exposition
//!
//! - `signstation_proxy_requests_total` (counter): labels `endpoint`, `status`
//! - `signstation_proxy_request_duration_seconds` (histogram): label `endpoint`
//! - `signstation_upstream_errors_total` (counter): labels `endpoint`, `error_type`
//! - `signstation_cors_rejections_total` (counter)

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "signstation_proxy_request_duration_seconds";

/// Bucket boundaries from 5ms to 60s, covering the configurable timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request on one of the signing endpoints.
pub fn record_request(endpoint: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "signstation_proxy_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "endpoint" => endpoint).record(duration_secs);
}

/// Record a failed or rejected upstream call.
pub fn record_upstream_error(endpoint: &'static str, error_type: &'static str) {
    metrics::counter!(
        "signstation_upstream_errors_total",
        "endpoint" => endpoint,
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a request refused by the origin policy.
pub fn record_cors_rejection() {
    metrics::counter!("signstation_cors_rejections_total").increment(1);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Recorder/handle pair that is not installed globally.
    pub(crate) fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_request("auth", 200, 0.05);
        record_upstream_error("sign", "timeout");
        record_cors_rejection();
    }

    #[test]
    fn request_metrics_carry_endpoint_and_status() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("sign", 200, 0.042);
        record_request("download", 504, 1.5);

        let output = handle.render();
        assert!(output.contains("signstation_proxy_requests_total"));
        assert!(output.contains("endpoint=\"sign\""));
        assert!(output.contains("status=\"504\""));
        assert!(
            output.contains("signstation_proxy_request_duration_seconds_bucket"),
            "duration must render as a histogram"
        );
        assert!(output.contains("le=\"60\""), "got: {output}");
    }

    #[test]
    fn upstream_errors_and_cors_rejections_are_counted() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream_error("auth", "timeout");
        record_upstream_error("sign", "connection");
        record_cors_rejection();
        record_cors_rejection();

        let output = handle.render();
        assert!(output.contains("error_type=\"timeout\""));
        assert!(output.contains("error_type=\"connection\""));
        assert!(output.contains("signstation_cors_rejections_total 2"), "got: {output}");
    }
}
