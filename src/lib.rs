pub mod common;
pub mod config;
pub mod lifecycle;
pub mod navigation;
pub mod node;
pub mod perception;

use crate::common::CoreError;
use crate::lifecycle::LifecycleNode;
use crate::navigation::PlanningStack;
use crate::perception::PerceptionStack;

/// Core functionality for the traffic-aware waypoint planner
pub struct WaypointCore {
    components: Vec<Box<dyn LifecycleNode>>,
}

impl WaypointCore {
    /// Create a new instance of WaypointCore
    pub fn new() -> Self {
        WaypointCore {
            components: Vec::new(),
        }
    }

    /// Register a component with the core
    pub fn register<T: LifecycleNode + 'static>(&mut self, component: T) {
        self.components.push(Box::new(component));
    }

    /// Initialize all registered components
    pub fn init(&mut self) -> Result<(), CoreError> {
        for component in &mut self.components {
            component.on_configure()?;
            component.on_activate()?;
        }
        Ok(())
    }

    /// Shutdown all registered components
    pub fn shutdown(&mut self) -> Result<(), CoreError> {
        for component in &mut self.components {
            component.on_deactivate()?;
            component.on_cleanup()?;
        }
        Ok(())
    }

    /// Get a mutable reference to the planning stack
    pub fn planning_stack_mut(&mut self) -> Option<&mut PlanningStack> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<PlanningStack>())
    }

    /// Get a mutable reference to the perception stack
    pub fn perception_stack_mut(&mut self) -> Option<&mut PerceptionStack> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<PerceptionStack>())
    }
}

impl Default for WaypointCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::State;

    #[test]
    fn init_and_shutdown_walk_every_component() {
        let mut core = WaypointCore::new();
        core.register(PlanningStack::new());
        core.register(PerceptionStack::new(vec![(10.0, 0.0)]));
        core.init().unwrap();

        assert_eq!(core.planning_stack_mut().unwrap().state(), State::Active);
        assert_eq!(core.perception_stack_mut().unwrap().state(), State::Active);

        core.shutdown().unwrap();
        assert_eq!(core.planning_stack_mut().unwrap().state(), State::Unconfigured);
    }

    #[test]
    fn init_fails_without_stop_lines() {
        let mut core = WaypointCore::new();
        core.register(PerceptionStack::new(Vec::new()));
        assert!(core.init().is_err());
    }
}
