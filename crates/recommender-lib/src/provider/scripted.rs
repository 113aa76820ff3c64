//! Scripted metrics provider
//!
//! Answers from preset per-application responses and records every call,
//! so cycles can be driven without a metrics backend.

use super::query::{PromDuration, QueryWindow};
use super::{MetricsProvider, ProviderError};
use crate::model::AggregateStateMap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub application: String,
    pub window: QueryWindow,
    /// False for history queries
    pub timeframe: bool,
}

#[derive(Debug, Clone)]
enum Response {
    Metrics(AggregateStateMap),
    Failure(String),
}

#[derive(Debug, Default)]
struct Script {
    history: HashMap<String, Response>,
    timeframe: HashMap<String, Response>,
    calls: Vec<ProviderCall>,
}

/// In-memory [`MetricsProvider`]. Applications without a scripted answer
/// return an empty aggregate map.
#[derive(Debug, Default)]
pub struct StaticProvider {
    script: Mutex<Script>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer both history and timeframe queries for `application`
    pub fn set_metrics(&self, application: &str, aggregates: AggregateStateMap) {
        let mut script = self.script();
        script
            .history
            .insert(application.to_string(), Response::Metrics(aggregates.clone()));
        script
            .timeframe
            .insert(application.to_string(), Response::Metrics(aggregates));
    }

    /// Answer only timeframe queries for `application`
    pub fn set_timeframe_metrics(&self, application: &str, aggregates: AggregateStateMap) {
        self.script()
            .timeframe
            .insert(application.to_string(), Response::Metrics(aggregates));
    }

    /// Fail every query for `application`
    pub fn set_failure(&self, application: &str, message: &str) {
        let mut script = self.script();
        script
            .history
            .insert(application.to_string(), Response::Failure(message.to_string()));
        script
            .timeframe
            .insert(application.to_string(), Response::Failure(message.to_string()));
    }

    pub fn clear(&self, application: &str) {
        let mut script = self.script();
        script.history.remove(application);
        script.timeframe.remove(application);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.script().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.script().calls.clear();
    }

    fn answer(
        &self,
        application: &str,
        window: QueryWindow,
        timeframe: bool,
    ) -> Result<AggregateStateMap, ProviderError> {
        let mut script = self.script();
        script.calls.push(ProviderCall {
            application: application.to_string(),
            window,
            timeframe,
        });

        let responses = if timeframe {
            &script.timeframe
        } else {
            &script.history
        };
        match responses.get(application) {
            Some(Response::Metrics(aggregates)) => Ok(aggregates.clone()),
            Some(Response::Failure(message)) => Err(ProviderError::Query {
                error_type: "scripted".to_string(),
                message: message.clone(),
            }),
            None => Ok(AggregateStateMap::new()),
        }
    }
}

#[async_trait]
impl MetricsProvider for StaticProvider {
    async fn get_history_metrics(
        &self,
        application: &str,
        history: PromDuration,
    ) -> Result<AggregateStateMap, ProviderError> {
        self.answer(application, QueryWindow::lookback(history), false)
    }

    async fn get_timeframe_metrics(
        &self,
        application: &str,
        window: &QueryWindow,
    ) -> Result<AggregateStateMap, ProviderError> {
        self.answer(application, *window, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AggregateContainerState, AggregateStateKey};

    fn aggregates() -> AggregateStateMap {
        let mut map = AggregateStateMap::new();
        map.insert(
            AggregateStateKey::new("svc-a", "web", "web-1"),
            AggregateContainerState::new(),
        );
        map
    }

    #[tokio::test]
    async fn test_scripted_answers_and_calls() {
        let provider = StaticProvider::new();
        provider.set_metrics("svc-a", aggregates());
        provider.set_failure("svc-b", "backend down");

        let history = PromDuration::days(90);
        assert_eq!(provider.get_history_metrics("svc-a", history).await.unwrap().len(), 1);
        assert!(provider.get_history_metrics("svc-b", history).await.is_err());
        assert!(provider.get_history_metrics("svc-c", history).await.unwrap().is_empty());

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].application, "svc-a");
        assert_eq!(calls[0].window, QueryWindow::lookback(history));
        assert!(!calls[0].timeframe);

        provider.reset_calls();
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timeframe_only_script() {
        let provider = StaticProvider::new();
        provider.set_timeframe_metrics("svc-a", aggregates());
        let window = QueryWindow::with_offset(PromDuration::minutes(60), PromDuration::hours(1));

        assert_eq!(provider.get_timeframe_metrics("svc-a", &window).await.unwrap().len(), 1);
        assert!(provider
            .get_history_metrics("svc-a", PromDuration::days(1))
            .await
            .unwrap()
            .is_empty());

        provider.clear("svc-a");
        assert!(provider.get_timeframe_metrics("svc-a", &window).await.unwrap().is_empty());
    }
}
