//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "beatsync_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "beatsync_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "beatsync_http_requests_in_flight";

    // Job metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "beatsync_jobs_submitted_total";
    pub const JOBS_SUCCEEDED_TOTAL: &str = "beatsync_jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "beatsync_jobs_failed_total";
    pub const PROCESSOR_DURATION_SECONDS: &str = "beatsync_processor_duration_seconds";

    // Artifact metrics
    pub const ARTIFACTS_DOWNLOADED_TOTAL: &str = "beatsync_artifacts_downloaded_total";
    pub const ARTIFACTS_DELETED_TOTAL: &str = "beatsync_artifacts_deleted_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a submission entering the pipeline.
pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a submission that produced an artifact.
pub fn record_job_succeeded() {
    counter!(names::JOBS_SUCCEEDED_TOTAL).increment(1);
}

/// Record a failed submission by failure class.
pub fn record_job_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record how long the processor ran and how it ended.
pub fn record_processor_duration(outcome: &str, duration: Duration) {
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::PROCESSOR_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

/// Record an artifact download.
pub fn record_artifact_downloaded() {
    counter!(names::ARTIFACTS_DOWNLOADED_TOTAL).increment(1);
}

/// Record an artifact cleanup.
pub fn record_artifact_deleted() {
    counter!(names::ARTIFACTS_DELETED_TOTAL).increment(1);
}

/// Sanitize path for metrics labels (collapse job ids).
fn sanitize_path(path: &str) -> String {
    static UUID: OnceLock<Regex> = OnceLock::new();
    static ID_SEGMENT: OnceLock<Regex> = OnceLock::new();

    let uuid = UUID.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("valid uuid pattern")
    });
    let id_segment = ID_SEGMENT.get_or_init(|| {
        Regex::new(r"^/api/(download|cleanup)/[^/]+$").expect("valid id segment pattern")
    });

    let path = uuid.replace_all(path, ":id");
    // Unknown ids would otherwise explode label cardinality.
    id_segment.replace_all(&path, "/api/$1/:id").to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/download/550e8400-e29b-41d4-a716-446655440000"),
            "/api/download/:id"
        );
        assert_eq!(sanitize_path("/api/cleanup/whatever"), "/api/cleanup/:id");
        assert_eq!(sanitize_path("/api/process-video"), "/api/process-video");
    }
}
