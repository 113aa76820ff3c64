//! Persistent store contract
//!
//! The store is the system of record for applications, timeframes and the
//! recommended container rows. The recommender only reads applications and
//! timeframes, upserts container rows and flips finished timeframes off;
//! the rest of the contract serves the admin tooling.

mod data;
mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::models::{Application, ApplicationResource, ContainerResource, NewTimeframe, Timeframe};
use async_trait::async_trait;
use std::time::Duration;

/// Errors returned by store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        StoreError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // Applications

    async fn list_applications(&self) -> Result<Vec<Application>, StoreError>;

    async fn get_application(&self, name: &str) -> Result<Application, StoreError>;

    async fn create_application(&self, name: &str) -> Result<Application, StoreError>;

    /// Rename an application
    async fn update_application(&self, name: &str, new_name: &str)
        -> Result<Application, StoreError>;

    /// Delete an application and every container row it owns
    async fn delete_application(&self, name: &str) -> Result<(), StoreError>;

    // Timeframes

    async fn list_timeframes(&self) -> Result<Vec<Timeframe>, StoreError>;

    async fn get_timeframe(&self, name: &str) -> Result<Timeframe, StoreError>;

    async fn create_timeframe(&self, timeframe: NewTimeframe) -> Result<Timeframe, StoreError>;

    /// Replace the timeframe with the same id
    async fn update_timeframe(&self, timeframe: Timeframe) -> Result<Timeframe, StoreError>;

    /// Replace several timeframes. Either every update is applied or none is.
    async fn update_timeframes(
        &self,
        timeframes: Vec<Timeframe>,
    ) -> Result<Vec<Timeframe>, StoreError>;

    /// Delete a timeframe and every container row recorded for it
    async fn delete_timeframe(&self, name: &str) -> Result<(), StoreError>;

    // Recommendations

    /// Current container rows of one application
    async fn get_application_resource(
        &self,
        application: &str,
    ) -> Result<ApplicationResource, StoreError>;

    async fn list_application_resources(&self) -> Result<Vec<ApplicationResource>, StoreError>;

    async fn get_timeframe_application_resource(
        &self,
        timeframe: &str,
        application: &str,
    ) -> Result<ApplicationResource, StoreError>;

    async fn list_timeframe_application_resources(
        &self,
        timeframe: &str,
    ) -> Result<Vec<ApplicationResource>, StoreError>;

    /// Upsert container rows keyed by (application, name, timeframe).
    ///
    /// An existing row keeps the larger of its stored and incoming limits.
    /// The batch is applied atomically.
    async fn add_or_update_container_resources(
        &self,
        resources: Vec<ContainerResource>,
    ) -> Result<Vec<ContainerResource>, StoreError>;
}
