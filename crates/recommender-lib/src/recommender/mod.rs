//! Recommendation routine
//!
//! Owns the cluster state and drives one reconciliation cycle at a time:
//! load, sync, fetch, recommend, persist. The daemon calls [`Recommender::run`]
//! which repeats the cycle on a fixed interval until shutdown.

mod resource;

pub use resource::{MaxResourceRecommender, ResourceRecommender};

use crate::feeder::ClusterStateFeeder;
use crate::health::HealthRegistry;
use crate::model::{ApplicationId, ClusterState, RecommendedContainerResource};
use crate::observability::{RecommenderMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;


/// What happened during one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub applications: usize,
    pub timeframes: usize,
    pub targets: usize,
    pub timeframe_targets: usize,
    pub fetch_succeeded: usize,
    pub fetch_failed: usize,
    pub skipped_windows: usize,
    pub store_errors: usize,
    pub persisted_rows: usize,
    pub completed_timeframes: Vec<String>,
}

impl CycleReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration: Duration::ZERO,
            applications: 0,
            timeframes: 0,
            targets: 0,
            timeframe_targets: 0,
            fetch_succeeded: 0,
            fetch_failed: 0,
            skipped_windows: 0,
            store_errors: 0,
            persisted_rows: 0,
            completed_timeframes: Vec::new(),
        }
    }
}

pub struct Recommender {
    cluster_state: ClusterState,
    feeder: ClusterStateFeeder,
    resource_recommender: Box<dyn ResourceRecommender>,
    health: HealthRegistry,
    metrics: RecommenderMetrics,
    logger: StructuredLogger,
}

impl Recommender {
    pub fn new(feeder: ClusterStateFeeder, health: HealthRegistry) -> Self {
        Self {
            cluster_state: ClusterState::new(),
            feeder,
            resource_recommender: Box::new(MaxResourceRecommender),
            health,
            metrics: RecommenderMetrics::new(),
            logger: StructuredLogger::new("recommender"),
        }
    }

    pub fn with_resource_recommender(mut self, recommender: Box<dyn ResourceRecommender>) -> Self {
        self.resource_recommender = recommender;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn cluster_state(&self) -> &ClusterState {
        &self.cluster_state
    }

    pub fn feeder(&self) -> &ClusterStateFeeder {
        &self.feeder
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Run exactly one cycle
    pub async fn run_once(&mut self) -> CycleReport {
        self.run_once_at(Utc::now()).await
    }

    /// Run exactly one cycle, treating `now` as the current time for
    /// timeframe windows
    pub async fn run_once_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(now);

        let feeder = &self.feeder;
        let state = &mut self.cluster_state;

        if feeder.load_applications(state).await.is_err() {
            report.store_errors += 1;
        }
        if feeder.load_timeframes(state).await.is_err() {
            report.store_errors += 1;
        }
        feeder.sync_targets(state);
        feeder.sync_timeframe_targets(state);

        let fetch_started = Instant::now();
        let current = feeder.load_metrics(state).await;
        self.metrics
            .observe_fetch_duration(fetch_started.elapsed().as_secs_f64());

        let fetch_started = Instant::now();
        let scoped = feeder.load_timeframe_metrics(state, now).await;
        self.metrics
            .observe_fetch_duration(fetch_started.elapsed().as_secs_f64());

        report.fetch_succeeded = current.succeeded + scoped.succeeded;
        report.fetch_failed = current.failed + scoped.failed;
        report.skipped_windows = scoped.skipped_windows;

        for target in state.all_targets_mut() {
            target.recommendation = self.resource_recommender.recommend(target.aggregates());
        }

        report.applications = state.applications().len();
        report.timeframes = state.timeframes().len();
        report.targets = state.targets().len();
        report.timeframe_targets = state.timeframe_target_count();

        match feeder.update_resources(state, &scoped.touched).await {
            Ok(persisted) => {
                report.persisted_rows = persisted.rows;
                report.completed_timeframes = persisted.completed_timeframes;
                self.log_recommendations();
            }
            Err(_) => report.store_errors += 1,
        }

        report.duration = started.elapsed();
        self.record(&report).await;
        report
    }

    fn log_recommendations(&self) {
        let state = &self.cluster_state;
        for (id, target) in state.targets() {
            for recommendation in &target.recommendation {
                self.logger
                    .log_recommendation(&id.name, None, recommendation);
            }
        }
        for (timeframe, targets) in state.timeframe_targets() {
            for (id, target) in targets {
                for recommendation in &target.recommendation {
                    self.logger
                        .log_recommendation(&id.name, Some(timeframe), recommendation);
                }
            }
        }
    }

    async fn record(&self, report: &CycleReport) {
        self.metrics
            .observe_cycle_duration(report.duration.as_secs_f64());
        self.metrics.set_state_sizes(
            report.applications,
            report.timeframes,
            report.targets,
            report.timeframe_targets,
        );
        self.metrics.add_fetch_errors(report.fetch_failed);
        self.metrics.add_store_errors(report.store_errors);
        self.metrics.add_window_skips(report.skipped_windows);
        self.metrics.add_persisted_rows(report.persisted_rows);
        self.metrics
            .add_completed_timeframes(report.completed_timeframes.len());

        for timeframe in &report.completed_timeframes {
            self.logger.log_timeframe_completed(timeframe);
        }
        self.logger.log_cycle(
            report.duration.as_millis(),
            report.applications,
            report.timeframes,
            report.fetch_failed,
            report.skipped_windows,
            report.store_errors,
            report.persisted_rows,
        );

        self.health.record_cycle(report).await;
    }

    /// Run a cycle now and then once per `interval` until `shutdown` fires.
    /// A cycle that overruns the interval delays the next one.
    pub async fn run(mut self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = interval.as_secs(),
            history = %self.feeder.config().history,
            workers = self.feeder.config().workers,
            "Starting recommendation loop"
        );

        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down recommendation loop");
                    break;
                }
            }
        }
    }

    /// Current recommendation of an application, if it has a target
    pub fn recommendation_for(
        &self,
        application: &str,
    ) -> Option<&[RecommendedContainerResource]> {
        self.cluster_state
            .target(&ApplicationId::new(application))
            .map(|t| t.recommendation.as_slice())
    }
}
