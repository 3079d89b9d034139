//! Prometheus metrics exposition
//!
//! The pipeline records its counters through the `metrics` facade; see
//! `auth_pipeline::metrics` for names and labels. Installing the recorder
//! here lets `--metrics` print them once a command finishes.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Sample lines of a rendered exposition, without `# TYPE`/`# HELP` comments.
pub fn samples(rendered: &str) -> Vec<&str> {
    rendered
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_pipeline::metrics::{record_invalidation, record_refresh, record_request};
    use auth_pipeline::{ErrorKind, InvalidationReason};
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Create an isolated recorder/handle pair for unit tests.
    /// Uses build_recorder() instead of install_recorder() to avoid the
    /// global recorder singleton constraint.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn pipeline_counters_render_as_samples() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(None);
        record_request(Some(ErrorKind::TransportError));
        record_refresh("success");
        record_invalidation(InvalidationReason::RetryRejected);

        let rendered = handle.render();
        let samples = samples(&rendered);
        assert!(samples.iter().all(|line| !line.starts_with('#')));
        assert!(
            samples.contains(&"client_token_refresh_total{outcome=\"success\"} 1"),
            "got: {samples:?}"
        );
        assert!(
            samples
                .iter()
                .any(|line| line.starts_with("client_requests_total{outcome=\"transport_error\"}")),
            "got: {samples:?}"
        );
        assert!(
            samples
                .iter()
                .any(|line| line.contains("reason=\"retry_rejected\"")),
            "got: {samples:?}"
        );
    }

    #[test]
    fn samples_skip_comments_and_blank_lines() {
        let rendered = "# TYPE client_requests_total counter\nclient_requests_total{outcome=\"ok\"} 3\n\n";
        assert_eq!(samples(rendered), vec!["client_requests_total{outcome=\"ok\"} 3"]);
    }
}
