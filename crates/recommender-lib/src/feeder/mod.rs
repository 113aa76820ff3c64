//! Cluster state feeder
//!
//! Reconciles the in-memory [`ClusterState`] against the store, keeps the
//! recommendation targets in step with the known applications and
//! timeframes, fetches usage aggregates for every target and writes the
//! resulting recommendations back.
//!
//! Every step is failure-local: a failed store or metrics call is logged,
//! the affected item is skipped and the rest of the cycle carries on.

use crate::model::{ApplicationId, ClusterState, RecommendedContainerResource};
use crate::models::{ContainerResource, TimeframeStatus};
use crate::provider::{timeframe_window, MetricsProvider, PromDuration, ProviderError, QueryWindow};
use crate::store::{Store, StoreError};
use crate::work::parallelize;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};


/// Feeder settings
#[derive(Debug, Clone)]
pub struct FeederConfig {
    /// Lookback for current recommendations (default: 90 days)
    pub history: PromDuration,
    /// Concurrent metrics fetches (default: 8)
    pub workers: usize,
    /// Timeout of one metrics call
    pub fetch_timeout: Duration,
    /// Timeout of one store call
    pub store_timeout: Duration,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            history: PromDuration::days(90),
            workers: 8,
            fetch_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one metrics fetch step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Timeframes skipped because their window cannot be queried
    pub skipped_windows: usize,
    /// Timeframes whose every application was fetched
    pub touched: HashSet<String>,
}

/// Outcome of the persist step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub rows: usize,
    pub completed_timeframes: Vec<String>,
}

/// Counts of targets added and removed by a sync step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub deleted: usize,
}

struct TimeframeJob {
    timeframe: String,
    application: String,
    window: QueryWindow,
}

pub struct ClusterStateFeeder {
    store: Arc<dyn Store>,
    provider: Arc<dyn MetricsProvider>,
    config: FeederConfig,
}

impl ClusterStateFeeder {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn MetricsProvider>,
        config: FeederConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn store_call<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.store_timeout)),
        }
    }

    /// Make the application set equal to the store's.
    ///
    /// On a store error the state is left as it was.
    pub async fn load_applications(&self, state: &mut ClusterState) -> Result<(), StoreError> {
        let applications = self
            .store_call(self.store.list_applications())
            .await
            .map_err(|e| {
                warn!(error = %e, "Cannot list applications, keeping known set");
                e
            })?;

        let fetched: HashSet<&str> = applications.iter().map(|a| a.name.as_str()).collect();
        let stale: Vec<String> = state
            .applications()
            .keys()
            .filter(|name| !fetched.contains(name.as_str()))
            .cloned()
            .collect();

        for name in stale {
            if state.delete_application(&name).is_ok() {
                info!(application = %name, "Application removed");
            }
        }

        for application in applications {
            if state.application(&application.name).is_none() {
                info!(application = %application.name, "Application added");
            }
            // Always replace so a recreated row's id is picked up
            state.add_application(application);
        }

        Ok(())
    }

    /// Make the timeframe set equal to the store's timeframes that are on
    pub async fn load_timeframes(&self, state: &mut ClusterState) -> Result<(), StoreError> {
        let timeframes = self
            .store_call(self.store.list_timeframes())
            .await
            .map_err(|e| {
                warn!(error = %e, "Cannot list timeframes, keeping known set");
                e
            })?;

        let active: Vec<_> = timeframes
            .into_iter()
            .filter(|t| t.status.is_on())
            .collect();
        let names: HashSet<&str> = active.iter().map(|t| t.name.as_str()).collect();
        let stale: Vec<String> = state
            .timeframes()
            .keys()
            .filter(|name| !names.contains(name.as_str()))
            .cloned()
            .collect();

        for name in stale {
            if state.delete_timeframe(&name).is_ok() {
                info!(timeframe = %name, "Timeframe removed");
            }
        }

        for timeframe in active {
            if state.timeframe(&timeframe.name).is_none() {
                info!(
                    timeframe = %timeframe.name,
                    start = %timeframe.start,
                    end = %timeframe.end,
                    "Timeframe added"
                );
            }
            state.add_timeframe(timeframe);
        }

        Ok(())
    }

    /// Make the target key set equal to the application set. Existing
    /// targets keep their aggregates.
    pub fn sync_targets(&self, state: &mut ClusterState) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let wanted: Vec<ApplicationId> = state
            .applications()
            .keys()
            .map(ApplicationId::new)
            .collect();
        for id in &wanted {
            if state.ensure_target(id) {
                debug!(application = %id, "Recommendation target created");
                summary.created += 1;
            }
        }

        let wanted: HashSet<ApplicationId> = wanted.into_iter().collect();
        let stale: Vec<ApplicationId> = state
            .targets()
            .keys()
            .filter(|id| !wanted.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            if state.delete_target(&id) {
                debug!(application = %id, "Recommendation target deleted");
                summary.deleted += 1;
            }
        }

        summary
    }

    /// Make the (timeframe, application) target set equal to the product of
    /// known timeframes and known applications
    pub fn sync_timeframe_targets(&self, state: &mut ClusterState) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let timeframes: Vec<String> = state.timeframes().keys().cloned().collect();
        let applications: Vec<ApplicationId> = state
            .applications()
            .keys()
            .map(ApplicationId::new)
            .collect();

        let mut wanted = HashSet::new();
        for timeframe in &timeframes {
            for id in &applications {
                if state.ensure_timeframe_target(timeframe, id) {
                    debug!(timeframe = %timeframe, application = %id, "Timeframe target created");
                    summary.created += 1;
                }
                wanted.insert((timeframe.clone(), id.clone()));
            }
        }

        let stale: Vec<(String, ApplicationId)> = state
            .timeframe_targets()
            .iter()
            .flat_map(|(timeframe, targets)| {
                targets.keys().map(move |id| (timeframe.clone(), id.clone()))
            })
            .filter(|pair| !wanted.contains(pair))
            .collect();
        for (timeframe, id) in stale {
            if state.delete_timeframe_target(&timeframe, &id) {
                debug!(timeframe = %timeframe, application = %id, "Timeframe target deleted");
                summary.deleted += 1;
            }
        }

        summary
    }

    /// Fetch history aggregates for every current target.
    ///
    /// A failed fetch leaves the target's previous aggregates in place.
    pub async fn load_metrics(&self, state: &mut ClusterState) -> FetchSummary {
        let applications: Arc<Vec<String>> =
            Arc::new(state.targets().keys().map(|id| id.name.clone()).collect());

        let provider = Arc::clone(&self.provider);
        let jobs = Arc::clone(&applications);
        let history = self.config.history;
        let timeout = self.config.fetch_timeout;

        let results = parallelize(self.config.workers, applications.len(), move |i| {
            let provider = Arc::clone(&provider);
            let jobs = Arc::clone(&jobs);
            async move {
                fetch_with_timeout(provider.get_history_metrics(&jobs[i], history), timeout).await
            }
        })
        .await;

        let mut summary = FetchSummary::default();
        for (application, result) in applications.iter().zip(results) {
            match result {
                Some(Ok(aggregates)) => {
                    debug!(application = %application, series = aggregates.len(), "Fetched history metrics");
                    if let Some(target) = state.target_mut(&ApplicationId::new(application.as_str())) {
                        target.set_aggregates(aggregates);
                    }
                    summary.succeeded += 1;
                }
                Some(Err(e)) => {
                    warn!(application = %application, error = %e, "Cannot fetch history metrics");
                    summary.failed += 1;
                }
                // Panicked job, already logged by the executor
                None => summary.failed += 1,
            }
        }

        summary
    }

    /// Fetch aggregates for every (timeframe, application) target whose
    /// window can be queried at `now`.
    ///
    /// Timeframes with an invalid window are skipped without a query and
    /// stay on for a later cycle. A timeframe is only `touched` when the
    /// fetch succeeded for every one of its applications; if any failed,
    /// the whole timeframe stays on and is fetched again next cycle.
    pub async fn load_timeframe_metrics(
        &self,
        state: &mut ClusterState,
        now: DateTime<Utc>,
    ) -> FetchSummary {
        let mut summary = FetchSummary::default();
        let mut jobs = Vec::new();

        for (name, targets) in state.timeframe_targets() {
            let Some(timeframe) = state.timeframe(name) else {
                continue;
            };
            match timeframe_window(timeframe.start, timeframe.end, now) {
                Ok(window) => {
                    for id in targets.keys() {
                        jobs.push(TimeframeJob {
                            timeframe: name.clone(),
                            application: id.name.clone(),
                            window,
                        });
                    }
                }
                Err(e) => {
                    warn!(timeframe = %name, error = %e, "Skipping timeframe with invalid window");
                    summary.skipped_windows += 1;
                }
            }
        }

        let jobs = Arc::new(jobs);
        let provider = Arc::clone(&self.provider);
        let shared = Arc::clone(&jobs);
        let timeout = self.config.fetch_timeout;

        let results = parallelize(self.config.workers, jobs.len(), move |i| {
            let provider = Arc::clone(&provider);
            let jobs = Arc::clone(&shared);
            async move {
                let job = &jobs[i];
                fetch_with_timeout(
                    provider.get_timeframe_metrics(&job.application, &job.window),
                    timeout,
                )
                .await
            }
        })
        .await;

        let mut fetched = HashSet::new();
        let mut incomplete = HashSet::new();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Some(Ok(aggregates)) => {
                    debug!(
                        timeframe = %job.timeframe,
                        application = %job.application,
                        window = %job.window.range_selector(),
                        series = aggregates.len(),
                        "Fetched timeframe metrics"
                    );
                    let id = ApplicationId::new(job.application.as_str());
                    if let Some(target) = state.timeframe_target_mut(&job.timeframe, &id) {
                        target.set_aggregates(aggregates);
                    }
                    fetched.insert(job.timeframe.as_str());
                    summary.succeeded += 1;
                }
                Some(Err(e)) => {
                    warn!(
                        timeframe = %job.timeframe,
                        application = %job.application,
                        error = %e,
                        "Cannot fetch timeframe metrics"
                    );
                    incomplete.insert(job.timeframe.as_str());
                    summary.failed += 1;
                }
                None => {
                    incomplete.insert(job.timeframe.as_str());
                    summary.failed += 1;
                }
            }
        }

        for timeframe in &incomplete {
            if fetched.contains(timeframe) {
                debug!(timeframe = %timeframe, "Timeframe partially fetched, keeping it on");
            }
        }
        summary.touched = fetched
            .difference(&incomplete)
            .map(|name| name.to_string())
            .collect();

        summary
    }

    /// Upsert every target's recommendation, then switch the `touched`
    /// timeframes off. Timeframes are only switched off once their rows
    /// were written.
    pub async fn update_resources(
        &self,
        state: &mut ClusterState,
        touched: &HashSet<String>,
    ) -> Result<PersistSummary, StoreError> {
        let now = Utc::now();
        let mut rows = Vec::new();

        for (id, target) in state.targets() {
            let Some(application) = state.application(&id.name) else {
                continue;
            };
            rows.extend(
                target
                    .recommendation
                    .iter()
                    .map(|r| container_row(r, application.id, None, now)),
            );
        }

        for (name, targets) in state.timeframe_targets() {
            let Some(timeframe) = state.timeframe(name) else {
                continue;
            };
            for (id, target) in targets {
                let Some(application) = state.application(&id.name) else {
                    continue;
                };
                rows.extend(
                    target
                        .recommendation
                        .iter()
                        .map(|r| container_row(r, application.id, Some(timeframe.id), now)),
                );
            }
        }

        let mut summary = PersistSummary::default();

        if !rows.is_empty() {
            let written = self
                .store_call(self.store.add_or_update_container_resources(rows))
                .await
                .map_err(|e| {
                    warn!(error = %e, "Cannot persist recommendations, timeframes stay on");
                    e
                })?;
            summary.rows = written.len();
        }

        let finished: Vec<_> = touched
            .iter()
            .filter_map(|name| state.timeframe(name))
            .cloned()
            .map(|mut timeframe| {
                timeframe.status = TimeframeStatus::Off;
                timeframe
            })
            .collect();
        if finished.is_empty() {
            return Ok(summary);
        }

        let updated = self
            .store_call(self.store.update_timeframes(finished))
            .await
            .map_err(|e| {
                warn!(error = %e, "Cannot switch finished timeframes off");
                e
            })?;

        for timeframe in updated {
            if let Err(e) = state.delete_timeframe(&timeframe.name) {
                debug!(timeframe = %timeframe.name, error = %e, "Completed timeframe not in state");
            }
            state.delete_timeframe_targets(&timeframe.name);
            summary.completed_timeframes.push(timeframe.name);
        }
        summary.completed_timeframes.sort();

        Ok(summary)
    }
}

async fn fetch_with_timeout<F, T>(call: F, timeout: Duration) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    }
}

fn container_row(
    recommendation: &RecommendedContainerResource,
    application_id: i64,
    timeframe_id: Option<i64>,
    now: DateTime<Utc>,
) -> ContainerResource {
    ContainerResource {
        id: 0,
        name: recommendation.container_name.clone(),
        application_id,
        timeframe_id,
        cpu_limit: recommendation.cpu_limit.into(),
        memory_limit: recommendation.memory_limit.into(),
        disk_read_io_limit: recommendation.disk_read_io_limit.into(),
        disk_write_io_limit: recommendation.disk_write_io_limit.into(),
        network_receive_io_limit: recommendation.network_receive_io_limit.into(),
        network_transmit_io_limit: recommendation.network_transmit_io_limit.into(),
        created: now,
        updated: now,
    }
}
