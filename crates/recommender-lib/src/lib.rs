//! Resource recommender library
//!
//! This crate provides the core functionality for:
//! - Application, timeframe and container-limit records and their stores
//! - Peak-usage queries against a Prometheus-compatible metrics backend
//! - The cluster state fed from the store and the backend
//! - The periodic recommendation cycle
//! - Health checks and observability

pub mod feeder;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod provider;
pub mod recommender;
pub mod store;
pub mod work;

pub use feeder::{ClusterStateFeeder, FeederConfig};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, LastCycle, ReadinessResponse,
};
pub use models::*;
pub use observability::{RecommenderMetrics, StructuredLogger};
pub use provider::{MetricsProvider, PrometheusConfig, PrometheusProvider, PromDuration};
pub use recommender::{CycleReport, Recommender};
pub use store::{FileStore, MemoryStore, Store, StoreError};
