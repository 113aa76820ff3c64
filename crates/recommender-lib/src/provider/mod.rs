//! Metrics providers
//!
//! A [`MetricsProvider`] turns an application name and a query window into
//! per-container aggregates. The production implementation talks to
//! Prometheus; [`StaticProvider`] replays scripted answers.

mod client;
mod prometheus;
mod query;
mod scripted;

pub use client::{PrometheusClient, Sample, Timeseries};
pub use prometheus::{metric_name, PrometheusConfig, PrometheusProvider};
pub use query::{
    timeframe_window, DurationParseError, DurationUnit, PromDuration, QueryWindow, WindowError,
};
pub use scripted::{ProviderCall, StaticProvider};

use crate::model::AggregateStateMap;
use async_trait::async_trait;
use std::time::Duration;

/// Errors returned by metrics providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid metrics backend address {0}: {1}")]
    InvalidAddress(String, String),

    #[error("metrics backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics backend returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("metrics query failed ({error_type}): {message}")]
    Query { error_type: String, message: String },

    #[error("malformed metrics response: {0}")]
    Malformed(String),

    #[error("series is missing label {0}")]
    MissingLabel(String),

    #[error("every resource query failed for {application}: {last}")]
    AllDimensionsFailed {
        application: String,
        last: Box<ProviderError>,
    },

    #[error("metrics request timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of per-container usage aggregates
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Peak usage over the trailing `history` window
    async fn get_history_metrics(
        &self,
        application: &str,
        history: PromDuration,
    ) -> Result<AggregateStateMap, ProviderError>;

    /// Peak usage over a window that ended in the past
    async fn get_timeframe_metrics(
        &self,
        application: &str,
        window: &QueryWindow,
    ) -> Result<AggregateStateMap, ProviderError>;
}
