//! In-process store

use super::data::StoreData;
use super::{Store, StoreError};
use crate::models::{Application, ApplicationResource, ContainerResource, NewTimeframe, Timeframe};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// A [`Store`] kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        Ok(self.data.read().await.list_applications())
    }

    async fn get_application(&self, name: &str) -> Result<Application, StoreError> {
        self.data.read().await.get_application(name)
    }

    async fn create_application(&self, name: &str) -> Result<Application, StoreError> {
        self.data.write().await.create_application(name, Utc::now())
    }

    async fn update_application(
        &self,
        name: &str,
        new_name: &str,
    ) -> Result<Application, StoreError> {
        self.data
            .write()
            .await
            .update_application(name, new_name, Utc::now())
    }

    async fn delete_application(&self, name: &str) -> Result<(), StoreError> {
        self.data.write().await.delete_application(name)
    }

    async fn list_timeframes(&self) -> Result<Vec<Timeframe>, StoreError> {
        Ok(self.data.read().await.list_timeframes())
    }

    async fn get_timeframe(&self, name: &str) -> Result<Timeframe, StoreError> {
        self.data.read().await.get_timeframe(name)
    }

    async fn create_timeframe(&self, timeframe: NewTimeframe) -> Result<Timeframe, StoreError> {
        self.data.write().await.create_timeframe(timeframe, Utc::now())
    }

    async fn update_timeframe(&self, timeframe: Timeframe) -> Result<Timeframe, StoreError> {
        self.data
            .write()
            .await
            .update_timeframe(timeframe, Utc::now())
    }

    async fn update_timeframes(
        &self,
        timeframes: Vec<Timeframe>,
    ) -> Result<Vec<Timeframe>, StoreError> {
        self.data
            .write()
            .await
            .update_timeframes(timeframes, Utc::now())
    }

    async fn delete_timeframe(&self, name: &str) -> Result<(), StoreError> {
        self.data.write().await.delete_timeframe(name)
    }

    async fn get_application_resource(
        &self,
        application: &str,
    ) -> Result<ApplicationResource, StoreError> {
        self.data.read().await.get_application_resource(application)
    }

    async fn list_application_resources(&self) -> Result<Vec<ApplicationResource>, StoreError> {
        Ok(self.data.read().await.list_application_resources())
    }

    async fn get_timeframe_application_resource(
        &self,
        timeframe: &str,
        application: &str,
    ) -> Result<ApplicationResource, StoreError> {
        self.data
            .read()
            .await
            .get_timeframe_application_resource(timeframe, application)
    }

    async fn list_timeframe_application_resources(
        &self,
        timeframe: &str,
    ) -> Result<Vec<ApplicationResource>, StoreError> {
        self.data
            .read()
            .await
            .list_timeframe_application_resources(timeframe)
    }

    async fn add_or_update_container_resources(
        &self,
        resources: Vec<ContainerResource>,
    ) -> Result<Vec<ContainerResource>, StoreError> {
        self.data
            .write()
            .await
            .add_or_update_container_resources(resources, Utc::now())
    }
}
