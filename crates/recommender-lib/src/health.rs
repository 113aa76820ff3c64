//! Recommender health
//!
//! Component status is derived from the outcome of each recommendation
//! cycle. The daemon counts as ready once a cycle has finished recently
//! enough for the stored recommendations to be current.

use crate::recommender::CycleReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A cycle older than this many intervals makes the daemon unready
pub const STALE_AFTER_CYCLES: u32 = 3;

const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some calls failed, recommendations may lag
    Degraded,
    /// Nothing useful came out of the last cycle
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            status,
            message,
            updated_at,
        }
    }
}

/// Summary of the most recent cycle, as shown on `/healthz`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCycle {
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub fetch_succeeded: usize,
    pub fetch_failed: usize,
    pub store_errors: usize,
    pub persisted_rows: usize,
    pub completed_timeframes: usize,
}

impl LastCycle {
    fn from_report(report: &CycleReport) -> Self {
        let duration =
            chrono::Duration::from_std(report.duration).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            finished_at: report.started_at + duration,
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            fetch_succeeded: report.fetch_succeeded,
            fetch_failed: report.fetch_failed,
            store_errors: report.store_errors,
            persisted_rows: report.persisted_rows,
            completed_timeframes: report.completed_timeframes.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<LastCycle>,
}

impl HealthResponse {
    /// Worst status among the components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_age_secs: Option<i64>,
}

impl ReadinessResponse {
    fn not_ready(reason: impl Into<String>, age: Option<i64>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
            last_cycle_age_secs: age,
        }
    }
}

pub mod components {
    /// State loading and target sync
    pub const FEEDER: &str = "feeder";
    pub const STORE: &str = "store";
    pub const METRICS_BACKEND: &str = "metrics_backend";

    pub const ALL: [&str; 3] = [FEEDER, STORE, METRICS_BACKEND];
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    last_cycle: Option<LastCycle>,
}

/// Shared view of the recommender's health, fed by [`HealthRegistry::record_cycle`]
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
    cycle_interval: Duration,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState::default())),
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
        }
    }

    /// Interval the daemon runs cycles at; readiness tolerates
    /// [`STALE_AFTER_CYCLES`] of them without a finished cycle.
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    pub fn cycle_interval(&self) -> Duration {
        self.cycle_interval
    }

    /// List every component before the first cycle runs
    pub async fn register_all(&self) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        for name in components::ALL {
            state.components.entry(name.to_string()).or_insert_with(|| {
                ComponentHealth::new(
                    ComponentStatus::Healthy,
                    Some("waiting for the first cycle".to_string()),
                    now,
                )
            });
        }
    }

    /// Derive component health from a finished cycle
    pub async fn record_cycle(&self, report: &CycleReport) {
        let cycle = LastCycle::from_report(report);
        let at = cycle.finished_at;

        let store = if report.store_errors > 0 {
            ComponentHealth::new(
                ComponentStatus::Degraded,
                Some(format!(
                    "{} store calls failed in the last cycle",
                    report.store_errors
                )),
                at,
            )
        } else {
            ComponentHealth::new(ComponentStatus::Healthy, None, at)
        };

        let backend = match (report.fetch_succeeded, report.fetch_failed) {
            (_, 0) => ComponentHealth::new(ComponentStatus::Healthy, None, at),
            (0, failed) => ComponentHealth::new(
                ComponentStatus::Unhealthy,
                Some(format!("all {} metrics fetches failed", failed)),
                at,
            ),
            (succeeded, failed) => ComponentHealth::new(
                ComponentStatus::Degraded,
                Some(format!(
                    "{} of {} metrics fetches failed",
                    failed,
                    succeeded + failed
                )),
                at,
            ),
        };

        let feeder = ComponentHealth::new(
            ComponentStatus::Healthy,
            Some(format!(
                "{} targets, {} timeframe targets",
                report.targets, report.timeframe_targets
            )),
            at,
        );

        let mut state = self.state.write().await;
        state.components.insert(components::STORE.to_string(), store);
        state
            .components
            .insert(components::METRICS_BACKEND.to_string(), backend);
        state.components.insert(components::FEEDER.to_string(), feeder);
        state.last_cycle = Some(cycle);
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(&state.components),
            components: state.components.clone(),
            last_cycle: state.last_cycle.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        self.readiness_at(Utc::now()).await
    }

    /// Readiness as seen at `now`
    pub async fn readiness_at(&self, now: DateTime<Utc>) -> ReadinessResponse {
        let state = self.state.read().await;

        let Some(cycle) = &state.last_cycle else {
            return ReadinessResponse::not_ready("No recommendation cycle completed yet", None);
        };

        let age = (now - cycle.finished_at).num_seconds().max(0);
        let max_age = self.cycle_interval.as_secs().max(1) * u64::from(STALE_AFTER_CYCLES);
        if age as u64 > max_age {
            return ReadinessResponse::not_ready(
                format!(
                    "Last cycle finished {}s ago, expected one every {}s",
                    age,
                    self.cycle_interval.as_secs()
                ),
                Some(age),
            );
        }

        let unhealthy = state
            .components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy);
        if let Some((name, component)) = unhealthy {
            let reason = match &component.message {
                Some(message) => format!("{} unhealthy: {}", name, message),
                None => format!("{} unhealthy", name),
            };
            return ReadinessResponse::not_ready(reason, Some(age));
        }

        ReadinessResponse {
            ready: true,
            reason: None,
            last_cycle_age_secs: Some(age),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn report(succeeded: usize, failed: usize, store_errors: usize) -> CycleReport {
        let mut report = CycleReport::new(at());
        report.duration = Duration::from_millis(1500);
        report.fetch_succeeded = succeeded;
        report.fetch_failed = failed;
        report.store_errors = store_errors;
        report.targets = succeeded + failed;
        report
    }

    #[tokio::test]
    async fn test_fresh_registry_is_not_ready() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 3);
        assert!(health.last_cycle.is_none());

        let readiness = registry.readiness_at(at()).await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("No recommendation cycle completed yet")
        );
    }

    #[tokio::test]
    async fn test_clean_cycle_makes_ready() {
        let registry = HealthRegistry::new();
        registry.record_cycle(&report(2, 0, 0)).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        let cycle = health.last_cycle.unwrap();
        assert_eq!(cycle.finished_at, at() + chrono::Duration::milliseconds(1500));
        assert_eq!(cycle.duration_ms, 1500);
        assert_eq!(
            health.components[components::FEEDER].message.as_deref(),
            Some("2 targets, 0 timeframe targets")
        );

        let readiness = registry
            .readiness_at(at() + chrono::Duration::seconds(30))
            .await;
        assert!(readiness.ready);
        assert_eq!(readiness.last_cycle_age_secs, Some(28));
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_degrades_but_stays_ready() {
        let registry = HealthRegistry::new();
        registry.record_cycle(&report(2, 1, 0)).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::METRICS_BACKEND].message.as_deref(),
            Some("1 of 3 metrics fetches failed")
        );
        assert!(registry.readiness_at(at()).await.ready);
    }

    #[tokio::test]
    async fn test_store_errors_degrade_store() {
        let registry = HealthRegistry::new();
        registry.record_cycle(&report(1, 0, 2)).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::STORE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            health.components[components::METRICS_BACKEND].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_backend_down_is_unhealthy_and_unready() {
        let registry = HealthRegistry::new();
        registry.record_cycle(&report(0, 3, 0)).await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        let readiness = registry.readiness_at(at()).await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("metrics_backend unhealthy: all 3 metrics fetches failed")
        );
    }

    #[tokio::test]
    async fn test_recovery_after_backend_outage() {
        let registry = HealthRegistry::new();
        registry.record_cycle(&report(0, 3, 0)).await;
        registry.record_cycle(&report(3, 0, 0)).await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        assert!(registry.readiness_at(at()).await.ready);
    }

    #[tokio::test]
    async fn test_stale_cycle_is_unready() {
        let registry = HealthRegistry::new().with_cycle_interval(Duration::from_secs(10));
        registry.record_cycle(&report(1, 0, 0)).await;

        let finished = at() + chrono::Duration::milliseconds(1500);
        assert!(
            registry
                .readiness_at(finished + chrono::Duration::seconds(30))
                .await
                .ready
        );

        let readiness = registry
            .readiness_at(finished + chrono::Duration::seconds(31))
            .await;
        assert!(!readiness.ready);
        assert_eq!(readiness.last_cycle_age_secs, Some(31));
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Last cycle finished 31s ago, expected one every 10s")
        );
    }

    #[test]
    fn test_compute_status_picks_worst() {
        let mut components = BTreeMap::new();
        assert_eq!(
            HealthResponse::compute_status(&components),
            ComponentStatus::Healthy
        );
        components.insert(
            "a".to_string(),
            ComponentHealth::new(ComponentStatus::Degraded, None, at()),
        );
        components.insert(
            "b".to_string(),
            ComponentHealth::new(ComponentStatus::Healthy, None, at()),
        );
        assert_eq!(
            HealthResponse::compute_status(&components),
            ComponentStatus::Degraded
        );
    }
}
