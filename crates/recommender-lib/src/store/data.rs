//! Store snapshot shared by the in-memory and file-backed stores

use super::StoreError;
use crate::models::{
    Application, ApplicationResource, ContainerResource, NewTimeframe, Timeframe,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const APPLICATION: &str = "application";
const TIMEFRAME: &str = "timeframe";

/// Every row of the store. Mutations that can fail part way work on a copy
/// and only replace `self` once every step succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreData {
    #[serde(default)]
    next_id: i64,
    #[serde(default)]
    applications: Vec<Application>,
    #[serde(default)]
    timeframes: Vec<Timeframe>,
    #[serde(default)]
    container_resources: Vec<ContainerResource>,
}

fn require_name(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!("{} name is empty", kind)));
    }
    Ok(())
}

fn require_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StoreError> {
    if start > end {
        return Err(StoreError::InvalidArgument(format!(
            "timeframe start {} is after end {}",
            start, end
        )));
    }
    Ok(())
}

impl StoreData {
    fn allocate_id(&mut self) -> i64 {
        // Snapshots written before ids were tracked still get fresh ids
        let highest = self
            .applications
            .iter()
            .map(|a| a.id)
            .chain(self.timeframes.iter().map(|t| t.id))
            .chain(self.container_resources.iter().map(|r| r.id))
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(highest) + 1;
        self.next_id
    }

    // Applications

    pub fn list_applications(&self) -> Vec<Application> {
        self.applications.clone()
    }

    fn find_application(&self, name: &str) -> Result<&Application, StoreError> {
        self.applications
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| StoreError::not_found(APPLICATION, name))
    }

    pub fn get_application(&self, name: &str) -> Result<Application, StoreError> {
        self.find_application(name).cloned()
    }

    pub fn create_application(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Application, StoreError> {
        require_name(APPLICATION, name)?;
        if self.applications.iter().any(|a| a.name == name) {
            return Err(StoreError::already_exists(APPLICATION, name));
        }

        let application = Application {
            id: self.allocate_id(),
            name: name.to_string(),
            created: now,
            updated: now,
        };
        self.applications.push(application.clone());
        Ok(application)
    }

    pub fn update_application(
        &mut self,
        name: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Application, StoreError> {
        require_name(APPLICATION, new_name)?;
        if new_name != name && self.applications.iter().any(|a| a.name == new_name) {
            return Err(StoreError::already_exists(APPLICATION, new_name));
        }

        let application = self
            .applications
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| StoreError::not_found(APPLICATION, name))?;
        application.name = new_name.to_string();
        application.updated = now;
        Ok(application.clone())
    }

    pub fn delete_application(&mut self, name: &str) -> Result<(), StoreError> {
        let id = self.find_application(name)?.id;
        self.applications.retain(|a| a.id != id);
        self.container_resources.retain(|r| r.application_id != id);
        Ok(())
    }

    // Timeframes

    pub fn list_timeframes(&self) -> Vec<Timeframe> {
        self.timeframes.clone()
    }

    fn find_timeframe(&self, name: &str) -> Result<&Timeframe, StoreError> {
        self.timeframes
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| StoreError::not_found(TIMEFRAME, name))
    }

    pub fn get_timeframe(&self, name: &str) -> Result<Timeframe, StoreError> {
        self.find_timeframe(name).cloned()
    }

    pub fn create_timeframe(
        &mut self,
        timeframe: NewTimeframe,
        now: DateTime<Utc>,
    ) -> Result<Timeframe, StoreError> {
        require_name(TIMEFRAME, &timeframe.name)?;
        require_ordered(timeframe.start, timeframe.end)?;
        if self.timeframes.iter().any(|t| t.name == timeframe.name) {
            return Err(StoreError::already_exists(TIMEFRAME, timeframe.name));
        }

        let created = Timeframe {
            id: self.allocate_id(),
            name: timeframe.name,
            start: timeframe.start,
            end: timeframe.end,
            status: timeframe.status,
            description: timeframe.description,
            created: now,
            updated: now,
        };
        self.timeframes.push(created.clone());
        Ok(created)
    }

    pub fn update_timeframe(
        &mut self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Timeframe, StoreError> {
        require_name(TIMEFRAME, &timeframe.name)?;
        require_ordered(timeframe.start, timeframe.end)?;
        if self
            .timeframes
            .iter()
            .any(|t| t.name == timeframe.name && t.id != timeframe.id)
        {
            return Err(StoreError::already_exists(TIMEFRAME, timeframe.name));
        }

        let stored = self
            .timeframes
            .iter_mut()
            .find(|t| t.id == timeframe.id)
            .ok_or_else(|| StoreError::not_found(TIMEFRAME, timeframe.name.clone()))?;
        *stored = Timeframe {
            created: stored.created,
            updated: now,
            ..timeframe
        };
        Ok(stored.clone())
    }

    pub fn update_timeframes(
        &mut self,
        timeframes: Vec<Timeframe>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Timeframe>, StoreError> {
        let mut next = self.clone();
        let updated = timeframes
            .into_iter()
            .map(|timeframe| next.update_timeframe(timeframe, now))
            .collect::<Result<Vec<_>, _>>()?;
        *self = next;
        Ok(updated)
    }

    pub fn delete_timeframe(&mut self, name: &str) -> Result<(), StoreError> {
        let id = self.find_timeframe(name)?.id;
        self.timeframes.retain(|t| t.id != id);
        self.container_resources
            .retain(|r| r.timeframe_id != Some(id));
        Ok(())
    }

    // Recommendations

    fn resource_for(&self, application: &Application, timeframe_id: Option<i64>) -> ApplicationResource {
        ApplicationResource {
            id: application.id,
            name: application.name.clone(),
            container_resources: self
                .container_resources
                .iter()
                .filter(|r| r.application_id == application.id && r.timeframe_id == timeframe_id)
                .cloned()
                .collect(),
        }
    }

    pub fn get_application_resource(
        &self,
        application: &str,
    ) -> Result<ApplicationResource, StoreError> {
        let application = self.find_application(application)?;
        Ok(self.resource_for(application, None))
    }

    pub fn list_application_resources(&self) -> Vec<ApplicationResource> {
        self.applications
            .iter()
            .map(|a| self.resource_for(a, None))
            .collect()
    }

    pub fn get_timeframe_application_resource(
        &self,
        timeframe: &str,
        application: &str,
    ) -> Result<ApplicationResource, StoreError> {
        let timeframe_id = self.find_timeframe(timeframe)?.id;
        let application = self.find_application(application)?;
        Ok(self.resource_for(application, Some(timeframe_id)))
    }

    pub fn list_timeframe_application_resources(
        &self,
        timeframe: &str,
    ) -> Result<Vec<ApplicationResource>, StoreError> {
        let timeframe_id = self.find_timeframe(timeframe)?.id;
        Ok(self
            .applications
            .iter()
            .map(|a| self.resource_for(a, Some(timeframe_id)))
            .collect())
    }

    pub fn add_or_update_container_resources(
        &mut self,
        resources: Vec<ContainerResource>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContainerResource>, StoreError> {
        let mut next = self.clone();
        let mut written = Vec::with_capacity(resources.len());

        for incoming in resources {
            require_name("container", &incoming.name)?;
            if !next.applications.iter().any(|a| a.id == incoming.application_id) {
                return Err(StoreError::not_found(
                    APPLICATION,
                    format!("#{}", incoming.application_id),
                ));
            }
            if let Some(timeframe_id) = incoming.timeframe_id {
                if !next.timeframes.iter().any(|t| t.id == timeframe_id) {
                    return Err(StoreError::not_found(TIMEFRAME, format!("#{}", timeframe_id)));
                }
            }

            let existing = next
                .container_resources
                .iter_mut()
                .find(|r| r.identity() == incoming.identity());
            match existing {
                Some(stored) => {
                    stored.raise_to(&incoming);
                    stored.updated = now;
                    written.push(stored.clone());
                }
                None => {
                    let row = ContainerResource {
                        id: next.allocate_id(),
                        created: now,
                        updated: now,
                        ..incoming
                    };
                    next.container_resources.push(row.clone());
                    written.push(row);
                }
            }
        }

        *self = next;
        Ok(written)
    }
}
