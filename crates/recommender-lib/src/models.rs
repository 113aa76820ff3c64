//! Persisted records owned by the store
//!
//! These are the rows the store keeps durably. The in-memory cluster model
//! in [`crate::model`] is rebuilt from them at the start of every cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logical service tracked for recommendations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Whether a timeframe still needs its one-shot recommendation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeStatus {
    On,
    #[default]
    Off,
}

impl TimeframeStatus {
    pub fn is_on(&self) -> bool {
        matches!(self, TimeframeStatus::On)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeframeStatus::On => "on",
            TimeframeStatus::Off => "off",
        }
    }
}

impl fmt::Display for TimeframeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeframeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(TimeframeStatus::On),
            "off" => Ok(TimeframeStatus::Off),
            other => Err(format!("status must be 'on' or 'off', got '{}'", other)),
        }
    }
}

/// A named historical window used for retrospective recommendations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub id: i64,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: TimeframeStatus,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Input for creating a timeframe
#[derive(Debug, Clone)]
pub struct NewTimeframe {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: TimeframeStatus,
    pub description: String,
}

impl NewTimeframe {
    pub fn new(name: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            status: TimeframeStatus::default(),
            description: String::new(),
        }
    }

    pub fn with_status(mut self, status: TimeframeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Recommended limits for one container of one application, on either the
/// current axis (`timeframe_id == None`) or one timeframe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResource {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub application_id: i64,
    #[serde(default)]
    pub timeframe_id: Option<i64>,
    pub cpu_limit: i64,
    pub memory_limit: i64,
    pub disk_read_io_limit: i64,
    pub disk_write_io_limit: i64,
    pub network_receive_io_limit: i64,
    pub network_transmit_io_limit: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ContainerResource {
    /// Upsert identity: (application, container name, timeframe-or-none)
    pub fn identity(&self) -> (i64, &str, Option<i64>) {
        (self.application_id, self.name.as_str(), self.timeframe_id)
    }

    /// Raise every limit to at least the matching limit of `other`
    pub fn raise_to(&mut self, other: &ContainerResource) {
        self.cpu_limit = self.cpu_limit.max(other.cpu_limit);
        self.memory_limit = self.memory_limit.max(other.memory_limit);
        self.disk_read_io_limit = self.disk_read_io_limit.max(other.disk_read_io_limit);
        self.disk_write_io_limit = self.disk_write_io_limit.max(other.disk_write_io_limit);
        self.network_receive_io_limit = self
            .network_receive_io_limit
            .max(other.network_receive_io_limit);
        self.network_transmit_io_limit = self
            .network_transmit_io_limit
            .max(other.network_transmit_io_limit);
    }
}

/// An application joined with its container rows for one reporting axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResource {
    pub id: i64,
    pub name: String,
    pub container_resources: Vec<ContainerResource>,
}
