use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for reload duration (seconds). Rebuilds are
/// expected to be fast (milliseconds to low tens of ms) so the buckets skew
/// tighter than a typical request-latency histogram.
const RELOAD_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Thin handle around the global metrics recorder. After `Metrics::install()`
/// the `metrics` crate macros (`counter!`, `gauge!`, `histogram!`) can be used
/// anywhere in the codebase; the `PrometheusHandle` is retained solely for
/// rendering a `/metrics` endpoint, which a caller wires up as it sees fit —
/// this crate has no HTTP server of its own.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric
    /// descriptions. Must be called once at startup before any `counter!` /
    /// `gauge!` / `histogram!` call.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                RELOAD_DURATION_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_gauge!(
            "discobox_routes_total",
            Unit::Count,
            "Number of routes in the currently published snapshot"
        );
        describe_counter!(
            "discobox_reloads_total",
            Unit::Count,
            "Total route-table rebuilds completed"
        );
        describe_histogram!(
            "discobox_reload_duration_seconds",
            Unit::Seconds,
            "Time spent rebuilding a route-table snapshot"
        );
        describe_counter!(
            "discobox_match_total",
            Unit::Count,
            "Total match attempts, labeled by result (matched/not_found)"
        );

        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
