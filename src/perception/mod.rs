//! Perception stack: turns signal reports into a stable stop index
pub mod classifier;
pub mod filters;
pub mod stop_lines;

use self::filters::{Filter, SignalObservation, StateDebouncer};
use self::stop_lines::{Correlation, StopLineCorrelator};
use crate::common::messages::{LightState, Pose, TrafficLight, Waypoint};
use crate::common::types::{StopIndex, StopLine};
use crate::common::CoreError;
use crate::config::PerceptionConfig;
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use std::any::Any;
use std::collections::HashMap;
use tracing::{debug, info};

/// Perception stack for the vehicle
pub struct PerceptionStack {
    base: LifecycleNodeBase,
    config: PerceptionConfig,
    correlator: StopLineCorrelator,
    debouncer: StateDebouncer,
}

impl PerceptionStack {
    /// Create a new perception stack for the given stop-lines
    pub fn new(stop_lines: Vec<StopLine>) -> Self {
        Self::with_config(stop_lines, PerceptionConfig::default())
    }

    pub fn with_config(stop_lines: Vec<StopLine>, config: PerceptionConfig) -> Self {
        PerceptionStack {
            base: LifecycleNodeBase::new("perception_stack"),
            correlator: StopLineCorrelator::new(stop_lines, config.clone()),
            debouncer: StateDebouncer::new(config.state_count_threshold),
            config,
        }
    }

    /// Configure the detector from a parameter map
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<(), CoreError> {
        let mut config = self.config.clone();
        config.configure(params)?;
        self.correlator.set_config(config.clone());
        self.debouncer.set_threshold(config.state_count_threshold);
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    /// Forget tracking state tied to the previous base path
    pub fn reset_tracking(&mut self) {
        self.correlator.reset();
    }

    /// Find the upcoming stop and its controlling signal
    pub fn correlate(
        &mut self,
        pose: &Pose,
        path: &[Waypoint],
        lights: &[TrafficLight],
    ) -> Option<Correlation> {
        if !self.base.is_active() {
            return None;
        }
        self.correlator.correlate(pose, path, lights)
    }

    /// Debounce one classified reading into the stable stop index
    pub fn debounce(&mut self, stop_index: StopIndex, state: LightState) -> StopIndex {
        let observation = match stop_index {
            Some(_) => SignalObservation::new(stop_index, state),
            None => SignalObservation::unknown(),
        };
        let stable = self.debouncer.filter(observation);
        debug!(
            raw = state.as_str(),
            committed = self.debouncer.last_state().as_str(),
            ?stable,
            "Debounced signal state"
        );
        stable
    }

    /// Last stable stop index, repeated when a frame produced no decision
    pub fn stable_stop_index(&self) -> StopIndex {
        self.debouncer.last_wp()
    }
}

impl LifecycleNode for PerceptionStack {
    fn on_configure(&mut self) -> Result<(), CoreError> {
        info!("Configuring perception stack");
        if self.correlator.stop_lines().is_empty() {
            return Err(CoreError::MissingConfig(
                "perception stack needs at least one stop-line".to_string(),
            ));
        }
        self.base.transition(State::Unconfigured, State::Inactive)
    }

    fn on_activate(&mut self) -> Result<(), CoreError> {
        info!("Activating perception stack");
        self.base.transition(State::Inactive, State::Active)
    }

    fn on_deactivate(&mut self) -> Result<(), CoreError> {
        info!("Deactivating perception stack");
        self.base.transition(State::Active, State::Inactive)
    }

    fn on_cleanup(&mut self) -> Result<(), CoreError> {
        info!("Cleaning up perception stack");
        self.correlator.reset();
        self.debouncer.reset();
        self.base.transition(State::Inactive, State::Unconfigured)
    }

    fn state(&self) -> State {
        self.base.get_state()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
