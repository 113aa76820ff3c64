//! Recommender configuration

use anyhow::{bail, Context, Result};
use recommender_lib::{FeederConfig, PromDuration, PrometheusConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recommender configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecommenderConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between recommendation cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Lookback of current recommendations, e.g. `90d`
    #[serde(default = "default_history")]
    pub history: String,

    /// Concurrent metrics fetches
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub store_timeout_secs: u64,

    /// Snapshot file backing the store
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

fn default_api_port() -> u16 {
    9098
}

fn default_interval() -> u64 {
    60
}

fn default_history() -> String {
    "90d".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_timeout() -> u64 {
    30
}

fn default_store_path() -> PathBuf {
    PathBuf::from("recommender-store.json")
}

impl RecommenderConfig {
    /// Load configuration from an optional file overlaid by `RECOMMENDER_*`
    /// environment variables (`RECOMMENDER_PROMETHEUS__ADDRESS` for nested keys)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("RECOMMENDER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let config: RecommenderConfig = config
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("interval_secs must be greater than zero");
        }
        self.history_duration()?;
        Ok(())
    }

    pub fn history_duration(&self) -> Result<PromDuration> {
        self.history
            .parse()
            .with_context(|| format!("invalid history duration {:?}", self.history))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn feeder_config(&self) -> Result<FeederConfig> {
        Ok(FeederConfig {
            history: self.history_duration()?,
            workers: self.workers,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            store_timeout: Duration::from_secs(self.store_timeout_secs),
        })
    }
}
