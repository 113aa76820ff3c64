//! In-memory cluster state
//!
//! Holds the applications and timeframes loaded from the store and the
//! recommendation targets derived from them. The state is owned by a single
//! task; none of its operations are synchronized.

use super::target::RecommendationTarget;
use super::types::ApplicationId;
use super::StateError;
use crate::models::{Application, Timeframe};
use std::collections::HashMap;

/// Targets of one timeframe, keyed by application
pub type TimeframeTargets = HashMap<ApplicationId, RecommendationTarget>;

#[derive(Debug, Default)]
pub struct ClusterState {
    applications: HashMap<String, Application>,
    targets: HashMap<ApplicationId, RecommendationTarget>,
    timeframes: HashMap<String, Timeframe>,
    timeframe_targets: HashMap<String, TimeframeTargets>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    // Applications

    pub fn applications(&self) -> &HashMap<String, Application> {
        &self.applications
    }

    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.get(name)
    }

    /// Insert an application, replacing any previous row with the same name
    pub fn add_application(&mut self, application: Application) {
        self.applications.insert(application.name.clone(), application);
    }

    pub fn delete_application(&mut self, name: &str) -> Result<Application, StateError> {
        self.applications
            .remove(name)
            .ok_or_else(|| StateError::KeyNotFound(name.to_string()))
    }

    // Targets for the current recommendation

    pub fn targets(&self) -> &HashMap<ApplicationId, RecommendationTarget> {
        &self.targets
    }

    pub fn target(&self, id: &ApplicationId) -> Option<&RecommendationTarget> {
        self.targets.get(id)
    }

    pub fn target_mut(&mut self, id: &ApplicationId) -> Option<&mut RecommendationTarget> {
        self.targets.get_mut(id)
    }

    /// Add a fresh target, discarding any accumulated aggregate under the same id
    pub fn add_or_update_target(&mut self, id: ApplicationId) {
        self.targets
            .insert(id.clone(), RecommendationTarget::new(id));
    }

    /// Create the target if absent. Returns true when one was created.
    pub fn ensure_target(&mut self, id: &ApplicationId) -> bool {
        if self.targets.contains_key(id) {
            return false;
        }
        self.add_or_update_target(id.clone());
        true
    }

    pub fn delete_target(&mut self, id: &ApplicationId) -> bool {
        self.targets.remove(id).is_some()
    }

    // Timeframes

    pub fn timeframes(&self) -> &HashMap<String, Timeframe> {
        &self.timeframes
    }

    pub fn timeframe(&self, name: &str) -> Option<&Timeframe> {
        self.timeframes.get(name)
    }

    pub fn add_timeframe(&mut self, timeframe: Timeframe) {
        self.timeframes.insert(timeframe.name.clone(), timeframe);
    }

    pub fn delete_timeframe(&mut self, name: &str) -> Result<Timeframe, StateError> {
        self.timeframes
            .remove(name)
            .ok_or_else(|| StateError::KeyNotFound(name.to_string()))
    }

    // Targets per timeframe

    pub fn timeframe_targets(&self) -> &HashMap<String, TimeframeTargets> {
        &self.timeframe_targets
    }

    pub fn timeframe_targets_for(&self, timeframe: &str) -> Option<&TimeframeTargets> {
        self.timeframe_targets.get(timeframe)
    }

    pub fn timeframe_target(
        &self,
        timeframe: &str,
        id: &ApplicationId,
    ) -> Option<&RecommendationTarget> {
        self.timeframe_targets.get(timeframe)?.get(id)
    }

    pub fn timeframe_target_mut(
        &mut self,
        timeframe: &str,
        id: &ApplicationId,
    ) -> Option<&mut RecommendationTarget> {
        self.timeframe_targets.get_mut(timeframe)?.get_mut(id)
    }

    /// Add a fresh (timeframe, application) target, discarding any previous one
    pub fn add_or_update_timeframe_target(&mut self, timeframe: &str, id: ApplicationId) {
        self.timeframe_targets
            .entry(timeframe.to_string())
            .or_default()
            .insert(id.clone(), RecommendationTarget::new(id));
    }

    /// Create the (timeframe, application) target if absent
    pub fn ensure_timeframe_target(&mut self, timeframe: &str, id: &ApplicationId) -> bool {
        let targets = self
            .timeframe_targets
            .entry(timeframe.to_string())
            .or_default();
        if targets.contains_key(id) {
            return false;
        }
        targets.insert(id.clone(), RecommendationTarget::new(id.clone()));
        true
    }

    pub fn delete_timeframe_target(&mut self, timeframe: &str, id: &ApplicationId) -> bool {
        let Some(targets) = self.timeframe_targets.get_mut(timeframe) else {
            return false;
        };
        let removed = targets.remove(id).is_some();
        if targets.is_empty() {
            self.timeframe_targets.remove(timeframe);
        }
        removed
    }

    /// Drop every target of a timeframe
    pub fn delete_timeframe_targets(&mut self, timeframe: &str) -> bool {
        self.timeframe_targets.remove(timeframe).is_some()
    }

    /// Every target on both axes
    pub fn all_targets_mut(&mut self) -> impl Iterator<Item = &mut RecommendationTarget> {
        self.targets
            .values_mut()
            .chain(self.timeframe_targets.values_mut().flat_map(|t| t.values_mut()))
    }

    pub fn timeframe_target_count(&self) -> usize {
        self.timeframe_targets.values().map(HashMap::len).sum()
    }
}
