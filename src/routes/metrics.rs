use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Generation jobs accepted by the provider"
    );
    metrics::describe_counter!(
        "generation_jobs_succeeded_total",
        "Generation jobs that produced an image"
    );
    metrics::describe_counter!(
        "generation_jobs_failed_total",
        "Generation jobs the provider reported as failed"
    );
    metrics::describe_counter!(
        "generation_jobs_timed_out_total",
        "Generation jobs abandoned after the polling budget"
    );
    metrics::describe_counter!(
        "provider_rate_limited_total",
        "Provider submits rejected with 429 and retried"
    );
    metrics::describe_counter!("photos_created_total", "Photo records created");
    metrics::describe_counter!(
        "name_allocation_conflicts_total",
        "Photo inserts that lost a race for the same name"
    );
    metrics::describe_histogram!(
        "generation_duration_seconds",
        "Submit to stored framed image, per photo"
    );
}

/// GET /metrics: Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}
