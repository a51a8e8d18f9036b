//! metrics.rs — Prometheus recorder and the `/metrics` route.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register help texts once per process; emit sites just use the macros.
pub fn ensure_metrics_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("sentiment_cycles_total", "Aggregation cycles started.");
        describe_counter!(
            "sentiment_cycle_failures_total",
            "Aggregation cycles aborted by a storage failure."
        );
        describe_counter!(
            "sentiment_source_fetch_errors_total",
            "Fetch failures per source (label: source)."
        );
        describe_counter!(
            "sentiment_posts_fetched_total",
            "Raw posts fetched per source (label: source)."
        );
        describe_counter!(
            "sentiment_posts_analyzed_total",
            "Posts that passed the language gate and were scored."
        );
        describe_counter!(
            "sentiment_posts_language_filtered_total",
            "Posts dropped as confidently non-Dutch."
        );
        describe_counter!(
            "sentiment_snapshot_cache_hits_total",
            "Snapshot requests served from cache."
        );
        describe_counter!(
            "sentiment_snapshot_cache_misses_total",
            "Snapshot requests that recomputed."
        );
        describe_counter!(
            "sentiment_buckets_deleted_total",
            "Hourly bucket files removed by retention cleanup."
        );
        describe_counter!(
            "sentiment_buckets_rotated_total",
            "Hourly bucket files folded into daily aggregates."
        );
        describe_counter!("sentiment_spikes_total", "Snapshots that flagged a spike.");
        describe_counter!(
            "sentiment_backfills_total",
            "Recovery backfill fetches performed."
        );
        describe_counter!(
            "sentiment_alerts_sent_total",
            "Critical alerts delivered to the webhook."
        );
        describe_gauge!(
            "sentiment_sources_available",
            "Sources reporting available in the last cycle."
        );
        describe_gauge!(
            "sentiment_overall_score",
            "Overall score of the most recent snapshot."
        );
        describe_gauge!(
            "sentiment_snapshot_cache_ttl_ms",
            "Configured snapshot cache TTL in milliseconds."
        );
        describe_histogram!(
            "sentiment_source_fetch_duration_ms",
            "Wall time of one source fetch (label: source)."
        );
        describe_histogram!(
            "sentiment_snapshot_build_duration_ms",
            "Wall time of a full snapshot rebuild."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder; call once at boot.
    pub fn init(ttl_ms: u64) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_metrics_described();
        gauge!("sentiment_snapshot_cache_ttl_ms").set(ttl_ms as f64);

        Self { handle }
    }

    /// Router exposing `/metrics` in Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
