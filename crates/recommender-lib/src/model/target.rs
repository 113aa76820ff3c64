//! Recommendation targets
//!
//! A target accumulates the aggregates fetched for one application (or one
//! timeframe/application pair) and holds the recommendation computed from them.

use super::aggregate::{aggregate_by_container_name, AggregateContainerState, AggregateStateMap};
use super::types::{AggregateStateKey, ApplicationId, ResourceAmount};
use std::collections::HashMap;

/// Recommended limits for one container name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendedContainerResource {
    pub container_name: String,
    pub cpu_limit: ResourceAmount,
    pub memory_limit: ResourceAmount,
    pub disk_read_io_limit: ResourceAmount,
    pub disk_write_io_limit: ResourceAmount,
    pub network_receive_io_limit: ResourceAmount,
    pub network_transmit_io_limit: ResourceAmount,
}

impl RecommendedContainerResource {
    pub fn from_aggregate(container_name: impl Into<String>, state: &AggregateContainerState) -> Self {
        Self {
            container_name: container_name.into(),
            cpu_limit: state.cpu,
            memory_limit: state.memory,
            disk_read_io_limit: state.disk_read_io,
            disk_write_io_limit: state.disk_write_io,
            network_receive_io_limit: state.network_receive_io,
            network_transmit_io_limit: state.network_transmit_io,
        }
    }
}

/// Accumulator and output holder for one recommendation ("VPA")
#[derive(Debug, Clone)]
pub struct RecommendationTarget {
    pub id: ApplicationId,
    pub recommendation: Vec<RecommendedContainerResource>,
    aggregates: AggregateStateMap,
}

impl RecommendationTarget {
    pub fn new(id: ApplicationId) -> Self {
        Self {
            id,
            recommendation: Vec::new(),
            aggregates: HashMap::new(),
        }
    }

    /// Replace the working aggregates with a freshly fetched set
    pub fn set_aggregates(&mut self, aggregates: AggregateStateMap) {
        self.aggregates = aggregates;
    }

    pub fn aggregates(&self) -> &AggregateStateMap {
        &self.aggregates
    }

    pub fn delete_aggregate(&mut self, key: &AggregateStateKey) {
        self.aggregates.remove(key);
    }

    pub fn aggregate_by_container_name(&self) -> HashMap<String, AggregateContainerState> {
        aggregate_by_container_name(&self.aggregates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_target_is_empty() {
        let target = RecommendationTarget::new(ApplicationId::new("svc-a"));
        assert!(target.aggregates().is_empty());
        assert!(target.recommendation.is_empty());
    }

    #[test]
    fn test_set_and_delete_aggregates() {
        let mut target = RecommendationTarget::new(ApplicationId::new("svc-a"));
        let key = AggregateStateKey::new("svc-a", "web", "web-1");
        let mut aggregates = AggregateStateMap::new();
        aggregates.insert(key.clone(), AggregateContainerState::new());

        target.set_aggregates(aggregates);
        assert_eq!(target.aggregates().len(), 1);

        target.delete_aggregate(&key);
        assert!(target.aggregates().is_empty());
    }
}
