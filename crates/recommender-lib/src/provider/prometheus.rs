//! Metrics provider backed by Prometheus
//!
//! Issues one `max_over_time` query per resource dimension and folds the
//! returned series into an aggregate map keyed by application, container and
//! sample group.

use super::client::{PrometheusClient, Timeseries};
use super::query::{PromDuration, QueryWindow};
use super::{MetricsProvider, ProviderError};
use crate::model::{AggregateStateKey, AggregateStateMap, ResourceAmount, ResourceName};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection and label settings for the Prometheus provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub address: String,
    /// Label carrying the application identity
    pub application_label: String,
    pub container_label: String,
    /// Label distinguishing series of the same container
    pub group_label: String,
    /// Regex of container names that never belong to an application
    pub excluded_containers: String,
    /// Extra matchers prepended to every selector
    pub selector: String,
    pub timeout_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:9090".to_string(),
            application_label: "system_mwType_serviceID".to_string(),
            container_label: "container_name".to_string(),
            group_label: "name".to_string(),
            excluded_containers: "POD".to_string(),
            selector: r#"job="kubernetes-cadvisor",image!="",name=~"^k8s_.*""#.to_string(),
            timeout_secs: 30,
        }
    }
}

impl PrometheusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Backend series name for each resource dimension
pub fn metric_name(resource: ResourceName) -> &'static str {
    match resource {
        ResourceName::Cpu => "container_cpu_usage_seconds_total:rate:1m",
        ResourceName::Memory => "container_memory_usage_bytes",
        ResourceName::DiskReadIo => "container_fs_reads_total:rate:1m",
        ResourceName::DiskWriteIo => "container_fs_writes_total:rate:1m",
        ResourceName::NetworkReceiveIo => "container_network_receive_bytes_total:rate:1m",
        ResourceName::NetworkTransmitIo => "container_network_transmit_bytes_total:rate:1m",
    }
}

/// Escape a value for use inside a double-quoted label matcher
fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub struct PrometheusProvider {
    client: PrometheusClient,
    config: PrometheusConfig,
}

impl PrometheusProvider {
    pub fn new(config: PrometheusConfig) -> Result<Self, ProviderError> {
        let client = PrometheusClient::new(&config.address, config.timeout())?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PrometheusConfig {
        &self.config
    }

    fn selector(&self, application: &str) -> String {
        let mut matchers = Vec::new();
        if !self.config.selector.trim().is_empty() {
            matchers.push(self.config.selector.trim().to_string());
        }
        if !self.config.excluded_containers.is_empty() {
            matchers.push(format!(
                "{}!~\"{}\"",
                self.config.container_label,
                escape_label_value(&self.config.excluded_containers)
            ));
        }
        matchers.push(format!(
            "{}=\"{}\"",
            self.config.application_label,
            escape_label_value(application)
        ));
        matchers.join(",")
    }

    /// Query string for one dimension of one application
    pub fn build_query(
        &self,
        resource: ResourceName,
        application: &str,
        window: &QueryWindow,
    ) -> String {
        format!(
            "max_over_time({}{{{}}}{})",
            metric_name(resource),
            self.selector(application),
            window.range_selector()
        )
    }

    fn key_for(&self, series: &Timeseries) -> Result<AggregateStateKey, ProviderError> {
        let label = |name: &str| {
            series
                .labels
                .get(name)
                .cloned()
                .ok_or_else(|| ProviderError::MissingLabel(name.to_string()))
        };
        Ok(AggregateStateKey::new(
            label(&self.config.application_label)?,
            label(&self.config.container_label)?,
            label(&self.config.group_label)?,
        ))
    }

    /// Fetch and decode one dimension completely before anything is applied
    async fn read_resource(
        &self,
        resource: ResourceName,
        application: &str,
        window: &QueryWindow,
    ) -> Result<HashMap<AggregateStateKey, ResourceAmount>, ProviderError> {
        let query = self.build_query(resource, application, window);
        debug!(application = %application, resource = %resource, query = %query, "Querying metrics backend");

        let series = self.client.get_timeseries(&query).await?;

        let mut amounts: HashMap<AggregateStateKey, ResourceAmount> = HashMap::new();
        for entry in &series {
            let key = self.key_for(entry)?;
            let amount = resource.amount_from_sample(entry.sample.value);
            amounts
                .entry(key)
                .and_modify(|current| *current = (*current).max(amount))
                .or_insert(amount);
        }
        Ok(amounts)
    }

    async fn fetch(
        &self,
        application: &str,
        window: &QueryWindow,
    ) -> Result<AggregateStateMap, ProviderError> {
        let mut aggregates = AggregateStateMap::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for resource in ResourceName::ALL {
            match self.read_resource(resource, application, window).await {
                Ok(amounts) => {
                    succeeded += 1;
                    for (key, amount) in amounts {
                        aggregates.entry(key).or_default().observe(resource, amount);
                    }
                }
                Err(e) => {
                    warn!(
                        application = %application,
                        resource = %resource,
                        error = %e,
                        "Failed to read resource metrics"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) if succeeded == 0 => Err(ProviderError::AllDimensionsFailed {
                application: application.to_string(),
                last: Box::new(last),
            }),
            _ => Ok(aggregates),
        }
    }
}

#[async_trait]
impl MetricsProvider for PrometheusProvider {
    async fn get_history_metrics(
        &self,
        application: &str,
        history: PromDuration,
    ) -> Result<AggregateStateMap, ProviderError> {
        self.fetch(application, &QueryWindow::lookback(history)).await
    }

    async fn get_timeframe_metrics(
        &self,
        application: &str,
        window: &QueryWindow,
    ) -> Result<AggregateStateMap, ProviderError> {
        self.fetch(application, window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn provider(url: &str) -> PrometheusProvider {
        PrometheusProvider::new(PrometheusConfig {
            address: url.to_string(),
            ..PrometheusConfig::default()
        })
        .unwrap()
    }

    fn vector_body(entries: &[(&str, &str, &str)]) -> String {
        let result: Vec<String> = entries
            .iter()
            .map(|(container, group, value)| {
                format!(
                    r#"{{"metric":{{"system_mwType_serviceID":"svc-a","container_name":"{}","name":"{}"}},"value":[1717243200,"{}"]}}"#,
                    container, group, value
                )
            })
            .collect();
        format!(
            r#"{{"status":"success","data":{{"resultType":"vector","result":[{}]}}}}"#,
            result.join(",")
        )
    }

    fn query_for(provider: &PrometheusProvider, resource: ResourceName) -> Matcher {
        let window = QueryWindow::lookback(PromDuration::days(90));
        Matcher::UrlEncoded("query".into(), provider.build_query(resource, "svc-a", &window))
    }

    #[test]
    fn test_build_query() {
        let provider = provider("http://localhost:9090");
        let query = provider.build_query(
            ResourceName::Memory,
            "svc-a",
            &QueryWindow::with_offset(PromDuration::minutes(60), PromDuration::hours(1)),
        );

        assert_eq!(
            query,
            r#"max_over_time(container_memory_usage_bytes{job="kubernetes-cadvisor",image!="",name=~"^k8s_.*",container_name!~"POD",system_mwType_serviceID="svc-a"}[60m] offset 1h)"#
        );
    }

    #[test]
    fn test_selector_escapes_application() {
        let provider = provider("http://localhost:9090");
        let query =
            provider.build_query(ResourceName::Cpu, r#"a"b"#, &QueryWindow::lookback(PromDuration::days(90)));
        assert!(query.contains(r#"system_mwType_serviceID="a\"b""#));
        assert!(query.ends_with("[90d])"));
    }

    #[test]
    fn test_empty_selector_and_exclusion() {
        let provider = PrometheusProvider::new(PrometheusConfig {
            selector: String::new(),
            excluded_containers: String::new(),
            ..PrometheusConfig::default()
        })
        .unwrap();
        let query =
            provider.build_query(ResourceName::Cpu, "svc-a", &QueryWindow::lookback(PromDuration::days(1)));
        assert_eq!(
            query,
            r#"max_over_time(container_cpu_usage_seconds_total:rate:1m{system_mwType_serviceID="svc-a"}[1d])"#
        );
    }

    #[tokio::test]
    async fn test_history_metrics_combines_dimensions() {
        let mut server = mockito::Server::new_async().await;
        let provider = provider(&server.url());
        server
            .mock("GET", "/api/v1/query")
            .match_query(query_for(&provider, ResourceName::Cpu))
            .with_status(200)
            .with_body(vector_body(&[("web", "k8s_web_1", "0.25"), ("web", "k8s_web_1", "0.5")]))
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(query_for(&provider, ResourceName::Memory))
            .with_status(200)
            .with_body(vector_body(&[("web", "k8s_web_1", "104857600")]))
            .create_async()
            .await;
        // Everything else returns an empty vector
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(vector_body(&[]))
            .create_async()
            .await;

        let aggregates = provider
            .get_history_metrics("svc-a", PromDuration::days(90))
            .await
            .unwrap();

        let state = &aggregates[&AggregateStateKey::new("svc-a", "web", "k8s_web_1")];
        assert_eq!(state.cpu.value(), 500);
        assert_eq!(state.memory.value(), 104_857_600);
        assert_eq!(state.disk_read_io, ResourceAmount::ZERO);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_dimensions() {
        let mut server = mockito::Server::new_async().await;
        let provider = provider(&server.url());
        server
            .mock("GET", "/api/v1/query")
            .match_query(query_for(&provider, ResourceName::Memory))
            .with_status(200)
            .with_body(vector_body(&[("web", "k8s_web_1", "2048")]))
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let aggregates = provider
            .get_history_metrics("svc-a", PromDuration::days(90))
            .await
            .unwrap();

        assert_eq!(aggregates.len(), 1);
        let state = aggregates.values().next().unwrap();
        assert_eq!(state.memory.value(), 2048);
        assert_eq!(state.cpu, ResourceAmount::ZERO);
    }

    #[tokio::test]
    async fn test_missing_label_fails_dimension() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"status":"success","data":{"resultType":"vector","result":[
                    {"metric":{"container_name":"web"},"value":[1717243200,"1"]}
                ]}}"#,
            )
            .create_async()
            .await;

        let err = provider(&server.url())
            .get_history_metrics("svc-a", PromDuration::days(90))
            .await
            .unwrap_err();

        match err {
            ProviderError::AllDimensionsFailed { application, last } => {
                assert_eq!(application, "svc-a");
                assert!(matches!(*last, ProviderError::MissingLabel(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_all_dimensions_failing_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .expect(6)
            .create_async()
            .await;

        let result = provider(&server.url())
            .get_timeframe_metrics(
                "svc-a",
                &QueryWindow::with_offset(PromDuration::minutes(60), PromDuration::hours(1)),
            )
            .await;

        assert!(matches!(result, Err(ProviderError::AllDimensionsFailed { .. })));
    }
}
