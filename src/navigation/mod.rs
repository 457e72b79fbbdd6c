//! Planning stack: locates the vehicle on the base path and generates the trajectory ahead
pub mod locator;
pub mod trajectory;

use self::locator::PathLocator;
use self::trajectory::{stop_index_ahead, TrajectoryGenerator};
use crate::common::messages::{Pose, Waypoint};
use crate::common::types::StopIndex;
use crate::common::CoreError;
use crate::config::PlannerConfig;
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Planning stack for the vehicle
pub struct PlanningStack {
    base: LifecycleNodeBase,
    locator: PathLocator,
    generator: TrajectoryGenerator,
    base_waypoints: Option<Arc<[Waypoint]>>,
    current_speed: f64,
    traffic_wp: StopIndex,
    apply_brake: bool,
}

impl PlanningStack {
    /// Create a new planning stack
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        PlanningStack {
            base: LifecycleNodeBase::new("planning_stack"),
            locator: PathLocator::new(),
            generator: TrajectoryGenerator::new(config),
            base_waypoints: None,
            current_speed: 0.0,
            traffic_wp: None,
            apply_brake: false,
        }
    }

    /// Configure the planner from a parameter map
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<(), CoreError> {
        let mut config = self.generator.config().clone();
        config.configure(params)?;
        self.generator.set_config(config);
        Ok(())
    }

    pub fn config(&self) -> &PlannerConfig {
        self.generator.config()
    }

    /// Replace the base path; the locator starts over with a full scan
    pub fn set_base_waypoints(&mut self, waypoints: Vec<Waypoint>) {
        info!("Received base path with {} waypoints", waypoints.len());
        self.locator.reset();
        self.base_waypoints = if waypoints.is_empty() {
            None
        } else {
            Some(waypoints.into())
        };
    }

    pub fn base_waypoints(&self) -> Option<Arc<[Waypoint]>> {
        self.base_waypoints.clone()
    }

    pub fn set_current_speed(&mut self, speed: f64) {
        self.current_speed = speed;
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    /// Store the stable stop index published by the detector
    pub fn set_traffic_waypoint(&mut self, stop_index: StopIndex) {
        self.traffic_wp = stop_index;
    }

    pub fn traffic_waypoint(&self) -> StopIndex {
        self.traffic_wp
    }

    pub fn is_braking(&self) -> bool {
        self.apply_brake
    }

    /// Path index found on the last planning tick
    pub fn last_index(&self) -> Option<usize> {
        self.locator.last_index()
    }

    /// Plan the trajectory for the current pose.
    ///
    /// Returns `None` while the stack is inactive or no base path is known.
    /// An empty trajectory means the braking request could not be honoured
    /// and the vehicle should hold its last safe command.
    pub fn plan(&mut self, pose: &Pose) -> Option<Vec<Waypoint>> {
        if !self.base.is_active() {
            debug!("Planning stack is not active, skipping");
            return None;
        }
        let path = self.base_waypoints.clone()?;
        let closest_index = self.locator.locate(&path, pose)?;

        let lookahead = self.generator.config().lookahead_wps;
        let traffic_wp = stop_index_ahead(closest_index, self.traffic_wp, lookahead, path.len());
        self.apply_brake = traffic_wp.is_some();

        match self
            .generator
            .generate(pose, &path, closest_index, self.current_speed, traffic_wp)
        {
            Ok(waypoints) => {
                debug!(
                    closest_index,
                    brake = self.apply_brake,
                    speed = self.current_speed,
                    "Generated {} waypoints",
                    waypoints.len()
                );
                Some(waypoints)
            }
            Err(e) => {
                warn!("Trajectory generation failed, publishing empty lane: {}", e);
                Some(Vec::new())
            }
        }
    }
}

impl Default for PlanningStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleNode for PlanningStack {
    fn on_configure(&mut self) -> Result<(), CoreError> {
        info!("Configuring planning stack");
        self.base.transition(State::Unconfigured, State::Inactive)
    }

    fn on_activate(&mut self) -> Result<(), CoreError> {
        info!("Activating planning stack");
        self.base.transition(State::Inactive, State::Active)
    }

    fn on_deactivate(&mut self) -> Result<(), CoreError> {
        info!("Deactivating planning stack");
        self.base.transition(State::Active, State::Inactive)
    }

    fn on_cleanup(&mut self) -> Result<(), CoreError> {
        info!("Cleaning up planning stack");
        self.locator.reset();
        self.base_waypoints = None;
        self.traffic_wp = None;
        self.apply_brake = false;
        self.base.transition(State::Inactive, State::Unconfigured)
    }

    fn state(&self) -> State {
        self.base.get_state()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
