//! Observability for the recommender
//!
//! Provides:
//! - Prometheus metrics (cycle and fetch latency, state sizes, error counts)
//! - Structured JSON logging of cycle, recommendation and timeframe events

use crate::model::RecommendedContainerResource;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, register_int_gauge_vec,
    Histogram, IntCounter, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle and fetch durations (in seconds)
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RecommenderMetricsInner> = OnceLock::new();

struct RecommenderMetricsInner {
    cycle_duration_seconds: Histogram,
    fetch_duration_seconds: Histogram,
    cycles: IntCounter,
    applications: IntGauge,
    timeframes: IntGauge,
    targets: IntGaugeVec,
    fetch_errors: IntCounter,
    store_errors: IntCounter,
    window_skips: IntCounter,
    persisted_rows: IntCounter,
    completed_timeframes: IntCounter,
}

impl RecommenderMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "recommender_cycle_duration_seconds",
                "Time spent in one reconciliation cycle",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            fetch_duration_seconds: register_histogram!(
                "recommender_fetch_duration_seconds",
                "Time spent fetching metrics for one axis of a cycle",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_duration_seconds"),

            cycles: register_int_counter!(
                "recommender_cycles_total",
                "Number of reconciliation cycles run"
            )
            .expect("Failed to register cycles"),

            applications: register_int_gauge!(
                "recommender_applications",
                "Applications known to the cluster state"
            )
            .expect("Failed to register applications"),

            timeframes: register_int_gauge!(
                "recommender_timeframes",
                "Active timeframes known to the cluster state"
            )
            .expect("Failed to register timeframes"),

            targets: register_int_gauge_vec!(
                "recommender_targets",
                "Recommendation targets by axis",
                &["axis"]
            )
            .expect("Failed to register targets"),

            fetch_errors: register_int_counter!(
                "recommender_fetch_errors_total",
                "Metrics fetches that failed or timed out"
            )
            .expect("Failed to register fetch_errors"),

            store_errors: register_int_counter!(
                "recommender_store_errors_total",
                "Store calls that failed or timed out"
            )
            .expect("Failed to register store_errors"),

            window_skips: register_int_counter!(
                "recommender_window_skips_total",
                "Timeframes skipped because their window could not be queried"
            )
            .expect("Failed to register window_skips"),

            persisted_rows: register_int_counter!(
                "recommender_persisted_rows_total",
                "Container recommendation rows written to the store"
            )
            .expect("Failed to register persisted_rows"),

            completed_timeframes: register_int_counter!(
                "recommender_completed_timeframes_total",
                "Timeframes switched off after their recommendations were stored"
            )
            .expect("Failed to register completed_timeframes"),
        }
    }
}

/// Recommender metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct RecommenderMetrics {
    _private: (),
}

impl Default for RecommenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommenderMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RecommenderMetricsInner {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
        self.inner().cycles.inc();
    }

    pub fn observe_fetch_duration(&self, duration_secs: f64) {
        self.inner().fetch_duration_seconds.observe(duration_secs);
    }

    /// Update the state size gauges
    pub fn set_state_sizes(
        &self,
        applications: usize,
        timeframes: usize,
        targets: usize,
        timeframe_targets: usize,
    ) {
        self.inner().applications.set(applications as i64);
        self.inner().timeframes.set(timeframes as i64);
        self.inner()
            .targets
            .with_label_values(&["current"])
            .set(targets as i64);
        self.inner()
            .targets
            .with_label_values(&["timeframe"])
            .set(timeframe_targets as i64);
    }

    pub fn add_fetch_errors(&self, count: usize) {
        self.inner().fetch_errors.inc_by(count as u64);
    }

    pub fn add_store_errors(&self, count: usize) {
        self.inner().store_errors.inc_by(count as u64);
    }

    pub fn add_window_skips(&self, count: usize) {
        self.inner().window_skips.inc_by(count as u64);
    }

    pub fn add_persisted_rows(&self, count: usize) {
        self.inner().persisted_rows.inc_by(count as u64);
    }

    pub fn add_completed_timeframes(&self, count: usize) {
        self.inner().completed_timeframes.inc_by(count as u64);
    }
}

/// Structured logger for recommender events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log one finished cycle
    #[allow(clippy::too_many_arguments)]
    pub fn log_cycle(
        &self,
        duration_ms: u128,
        applications: usize,
        timeframes: usize,
        fetch_failures: usize,
        skipped_windows: usize,
        store_errors: usize,
        persisted_rows: usize,
    ) {
        if fetch_failures > 0 || store_errors > 0 {
            warn!(
                event = "cycle_completed",
                instance = %self.instance,
                duration_ms = duration_ms as u64,
                applications = applications,
                timeframes = timeframes,
                fetch_failures = fetch_failures,
                skipped_windows = skipped_windows,
                store_errors = store_errors,
                persisted_rows = persisted_rows,
                "Recommendation cycle completed with errors"
            );
        } else {
            info!(
                event = "cycle_completed",
                instance = %self.instance,
                duration_ms = duration_ms as u64,
                applications = applications,
                timeframes = timeframes,
                skipped_windows = skipped_windows,
                persisted_rows = persisted_rows,
                "Recommendation cycle completed"
            );
        }
    }

    /// Log one stored container recommendation
    pub fn log_recommendation(
        &self,
        application: &str,
        timeframe: Option<&str>,
        recommendation: &RecommendedContainerResource,
    ) {
        info!(
            event = "recommendation_persisted",
            instance = %self.instance,
            application = %application,
            timeframe = timeframe.unwrap_or(""),
            container = %recommendation.container_name,
            cpu_limit_millicores = recommendation.cpu_limit.value(),
            memory_limit_bytes = recommendation.memory_limit.value(),
            disk_read_io_limit = recommendation.disk_read_io_limit.value(),
            disk_write_io_limit = recommendation.disk_write_io_limit.value(),
            network_receive_io_limit = recommendation.network_receive_io_limit.value(),
            network_transmit_io_limit = recommendation.network_transmit_io_limit.value(),
            "Stored container recommendation"
        );
    }

    pub fn log_timeframe_completed(&self, timeframe: &str) {
        info!(
            event = "timeframe_completed",
            instance = %self.instance,
            timeframe = %timeframe,
            "Timeframe recommendations stored, timeframe switched off"
        );
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64, history: &str) {
        info!(
            event = "recommender_started",
            instance = %self.instance,
            version = %version,
            interval_secs = interval_secs,
            history = %history,
            "Resource recommender started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "recommender_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Resource recommender shutting down"
        );
    }
}
