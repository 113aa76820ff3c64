//! Resource quantities and identities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest amount any resource may hold
pub const MAX_RESOURCE_AMOUNT: i64 = 100_000_000_000_000;

/// Resource dimensions tracked per container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceName {
    /// CPU in millicores
    Cpu,
    /// Memory in bytes
    Memory,
    DiskReadIo,
    DiskWriteIo,
    NetworkReceiveIo,
    NetworkTransmitIo,
}

impl ResourceName {
    pub const ALL: [ResourceName; 6] = [
        ResourceName::Cpu,
        ResourceName::Memory,
        ResourceName::DiskReadIo,
        ResourceName::DiskWriteIo,
        ResourceName::NetworkReceiveIo,
        ResourceName::NetworkTransmitIo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::Cpu => "cpu",
            ResourceName::Memory => "memory",
            ResourceName::DiskReadIo => "disk-read-io",
            ResourceName::DiskWriteIo => "disk-write-io",
            ResourceName::NetworkReceiveIo => "network-receive-io",
            ResourceName::NetworkTransmitIo => "network-transmit-io",
        }
    }

    /// Convert a raw backend sample into this resource's native unit
    pub fn amount_from_sample(&self, value: f64) -> ResourceAmount {
        match self {
            ResourceName::Cpu => ResourceAmount::from_cores(value),
            _ => ResourceAmount::from_f64(value),
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative quantity of a resource in its native unit, clamped to
/// `[0, MAX_RESOURCE_AMOUNT]`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceAmount(i64);

impl ResourceAmount {
    pub const ZERO: ResourceAmount = ResourceAmount(0);
    pub const MAX: ResourceAmount = ResourceAmount(MAX_RESOURCE_AMOUNT);

    /// Clamp a float sample into range. Fractions are truncated; NaN maps to zero.
    pub fn from_f64(amount: f64) -> Self {
        if amount.is_nan() || amount <= 0.0 {
            Self::ZERO
        } else if amount >= MAX_RESOURCE_AMOUNT as f64 {
            Self::MAX
        } else {
            ResourceAmount(amount as i64)
        }
    }

    /// CPU cores to millicores
    pub fn from_cores(cores: f64) -> Self {
        Self::from_f64(cores * 1000.0)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn as_cores(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl From<ResourceAmount> for i64 {
    fn from(amount: ResourceAmount) -> Self {
        amount.0
    }
}

impl fmt::Display for ResourceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a recommendation target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub name: String,
}

impl ApplicationId {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Bucket for raw samples before they are merged per container name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateStateKey {
    application: String,
    container: String,
    group: String,
}

impl AggregateStateKey {
    pub fn new(
        application: impl Into<String>,
        container: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            container: container.into(),
            group: group.into(),
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application
    }

    pub fn container_name(&self) -> &str {
        &self.container
    }

    /// Sample-group name (e.g. the runtime container name)
    pub fn group_name(&self) -> &str {
        &self.group
    }
}
