//! Resource recommenders

use crate::model::{aggregate_by_container_name, AggregateStateMap, RecommendedContainerResource};

/// Turns a target's aggregates into per-container limits
pub trait ResourceRecommender: Send + Sync {
    fn recommend(&self, aggregates: &AggregateStateMap) -> Vec<RecommendedContainerResource>;
}

/// Recommends the peak observed usage of every container name, merged
/// across sample groups. Output is ordered by container name.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxResourceRecommender;

impl ResourceRecommender for MaxResourceRecommender {
    fn recommend(&self, aggregates: &AggregateStateMap) -> Vec<RecommendedContainerResource> {
        let mut recommendation: Vec<_> = aggregate_by_container_name(aggregates)
            .into_iter()
            .map(|(name, state)| RecommendedContainerResource::from_aggregate(name, &state))
            .collect();
        recommendation.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        recommendation
    }
}
