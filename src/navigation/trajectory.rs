//! Trajectory generation module

use crate::common::geometry::distance;
use crate::common::messages::{Pose, Waypoint};
use crate::common::types::StopIndex;
use crate::common::CoreError;
use crate::config::PlannerConfig;

/// Below this the vehicle counts as standing still
const MIN_MOVING_SPEED: f64 = 1e-6;

/// Fraction of the cruise acceleration used while a stop is still far away
const APPROACH_ACCEL_FACTOR: f64 = 0.25;

/// A trajectory generator for the vehicle
#[derive(Debug, Clone)]
pub struct TrajectoryGenerator {
    config: PlannerConfig,
}

impl TrajectoryGenerator {
    /// Create a new trajectory generator
    pub fn new(config: PlannerConfig) -> Self {
        TrajectoryGenerator { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PlannerConfig) {
        self.config = config;
    }

    /// Generate the next `lookahead_wps` waypoints starting at `closest_index`.
    ///
    /// Without a stop the speed ramps up toward the limit. With a stop the
    /// waypoints slow down over the braking distance and reach zero at the
    /// stop index.
    pub fn generate(
        &self,
        pose: &Pose,
        path: &[Waypoint],
        closest_index: usize,
        current_speed: f64,
        stop_index: StopIndex,
    ) -> Result<Vec<Waypoint>, CoreError> {
        if path.is_empty() {
            return Err(CoreError::EmptyPath);
        }
        if !current_speed.is_finite() {
            return Err(CoreError::InvalidBrakingRequest(format!(
                "current speed {} is not finite",
                current_speed
            )));
        }
        let current_speed = current_speed.max(0.0);

        match stop_index {
            None => Ok(self.cruise(path, closest_index, current_speed)),
            Some(stop) if stop < path.len() => {
                Ok(self.brake(pose, path, closest_index, current_speed, stop))
            }
            Some(stop) => Err(CoreError::InvalidBrakingRequest(format!(
                "stop index {} outside a path of {} waypoints",
                stop,
                path.len()
            ))),
        }
    }

    fn speed_limit(&self) -> f64 {
        self.config.max_speed
    }

    fn clamp(&self, speed: f64) -> f64 {
        speed.min(self.speed_limit()).max(0.0)
    }

    fn window<'a>(
        &self,
        path: &'a [Waypoint],
        closest_index: usize,
    ) -> impl Iterator<Item = (usize, &'a Waypoint)> + 'a {
        let num_waypoints = path.len();
        (closest_index..closest_index.saturating_add(self.config.lookahead_wps)).map(move |i| {
            let idx = i % num_waypoints;
            (idx, &path[idx])
        })
    }

    fn cruise(&self, path: &[Waypoint], closest_index: usize, current_speed: f64) -> Vec<Waypoint> {
        let mut speed = current_speed;
        self.window(path, closest_index)
            .map(|(_, wp)| {
                speed = (speed + self.config.accel).min(self.speed_limit());
                wp.with_speed(self.clamp(speed))
            })
            .collect()
    }

    fn brake(
        &self,
        pose: &Pose,
        path: &[Waypoint],
        closest_index: usize,
        current_speed: f64,
        stop: usize,
    ) -> Vec<Waypoint> {
        let braking_distance = self.config.braking_distance();
        let stop_position = path[stop].position();
        let stop_distance = distance(&pose.position, stop_position);

        // standing still: the final approach holds zero, the limit of the formula
        let brake_coeff = if current_speed > MIN_MOVING_SPEED {
            Some(stop_distance.min(braking_distance) / current_speed)
        } else {
            None
        };

        let mut speed = current_speed;
        let mut stop_found = false;

        self.window(path, closest_index)
            .map(|(idx, wp)| {
                if stop_found || idx == stop {
                    stop_found = true;
                    return wp.with_speed(0.0);
                }

                let wp_distance = distance(wp.position(), stop_position);
                let target = if wp_distance > braking_distance {
                    speed = (speed + self.config.accel * APPROACH_ACCEL_FACTOR)
                        .min(self.speed_limit());
                    speed
                } else if wp_distance > self.config.stop_distance {
                    self.config.creep_speed
                } else {
                    match brake_coeff {
                        Some(coeff) => current_speed - coeff * (braking_distance - wp_distance),
                        None => 0.0,
                    }
                };
                wp.with_speed(self.clamp(target))
            })
            .collect()
    }
}

/// Keep `stop_index` only when it falls within the next `lookahead` waypoints
pub fn stop_index_ahead(
    closest_index: usize,
    stop_index: StopIndex,
    lookahead: usize,
    num_waypoints: usize,
) -> StopIndex {
    let stop = stop_index?;
    if num_waypoints == 0 || stop >= num_waypoints {
        return None;
    }
    (0..lookahead)
        .map(|i| (closest_index + i) % num_waypoints)
        .find(|&idx| idx == stop)
}
