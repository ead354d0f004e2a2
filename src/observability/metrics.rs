//! Metrics collection and exposition.
//!
//! # Metrics
//! - `palisade_requests_total` (counter): requests by route class, status
//! - `palisade_request_duration_seconds` (histogram): pipeline + handler latency
//! - `palisade_rejections_total` (counter): rejections by kind
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for route class, status and rejection kind only; client
//!   identities are never labels (unbounded cardinality)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    if let Err(e) = builder.install() {
        tracing::error!(error = %e, "Failed to install metrics exporter");
        return;
    }

    describe_counter!(
        "palisade_requests_total",
        "Requests processed by the defense pipeline"
    );
    describe_counter!(
        "palisade_rejections_total",
        "Requests rejected inside the pipeline, by kind"
    );
    describe_histogram!(
        "palisade_request_duration_seconds",
        "Time from pipeline entry to response completion"
    );

    tracing::info!(address = %addr, "Metrics exporter listening");
}

/// Record one completed request.
pub fn record_request(route_class: &'static str, status: u16, start: Instant) {
    counter!(
        "palisade_requests_total",
        "route_class" => route_class,
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!(
        "palisade_request_duration_seconds",
        "route_class" => route_class,
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record one pipeline rejection.
pub fn record_rejected(kind: &'static str) {
    counter!("palisade_rejections_total", "kind" => kind).increment(1);
}
