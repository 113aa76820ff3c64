//! Aggregated container usage

use super::types::{AggregateStateKey, ResourceAmount, ResourceName};
use std::collections::HashMap;

/// Raw per-key aggregates as returned by a metrics provider
pub type AggregateStateMap = HashMap<AggregateStateKey, AggregateContainerState>;

/// Peak usage of one container across the six tracked dimensions.
///
/// Merging takes the elementwise maximum, so it is commutative, associative
/// and idempotent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateContainerState {
    pub cpu: ResourceAmount,
    pub memory: ResourceAmount,
    pub disk_read_io: ResourceAmount,
    pub disk_write_io: ResourceAmount,
    pub network_receive_io: ResourceAmount,
    pub network_transmit_io: ResourceAmount,
}

impl AggregateContainerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: ResourceName) -> ResourceAmount {
        match resource {
            ResourceName::Cpu => self.cpu,
            ResourceName::Memory => self.memory,
            ResourceName::DiskReadIo => self.disk_read_io,
            ResourceName::DiskWriteIo => self.disk_write_io,
            ResourceName::NetworkReceiveIo => self.network_receive_io,
            ResourceName::NetworkTransmitIo => self.network_transmit_io,
        }
    }

    pub fn set(&mut self, resource: ResourceName, amount: ResourceAmount) {
        let slot = match resource {
            ResourceName::Cpu => &mut self.cpu,
            ResourceName::Memory => &mut self.memory,
            ResourceName::DiskReadIo => &mut self.disk_read_io,
            ResourceName::DiskWriteIo => &mut self.disk_write_io,
            ResourceName::NetworkReceiveIo => &mut self.network_receive_io,
            ResourceName::NetworkTransmitIo => &mut self.network_transmit_io,
        };
        *slot = amount;
    }

    /// Raise one dimension to at least `amount`
    pub fn observe(&mut self, resource: ResourceName, amount: ResourceAmount) {
        if self.get(resource) < amount {
            self.set(resource, amount);
        }
    }

    pub fn merge(&mut self, other: &AggregateContainerState) {
        for resource in ResourceName::ALL {
            self.observe(resource, other.get(resource));
        }
    }

    pub fn merged(mut self, other: &AggregateContainerState) -> Self {
        self.merge(other);
        self
    }
}

/// Merge all aggregates sharing a container name, discarding the
/// application and sample-group distinctions of their keys
pub fn aggregate_by_container_name(
    states: &AggregateStateMap,
) -> HashMap<String, AggregateContainerState> {
    let mut by_name: HashMap<String, AggregateContainerState> = HashMap::new();
    for (key, state) in states {
        by_name
            .entry(key.container_name().to_string())
            .or_default()
            .merge(state);
    }
    by_name
}
