//! Cluster model
//!
//! Resource amounts, per-container aggregates, recommendation targets and the
//! cluster state that ties them to the applications and timeframes loaded
//! from the store.

mod aggregate;
mod cluster;
mod target;
mod types;

pub use aggregate::{aggregate_by_container_name, AggregateContainerState, AggregateStateMap};
pub use cluster::{ClusterState, TimeframeTargets};
pub use target::{RecommendationTarget, RecommendedContainerResource};
pub use types::{
    AggregateStateKey, ApplicationId, ResourceAmount, ResourceName, MAX_RESOURCE_AMOUNT,
};

/// Errors raised by cluster state bookkeeping
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("key {0} not found in cluster state")]
    KeyNotFound(String),
}
