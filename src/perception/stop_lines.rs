//! Correlating stop-lines and live signal reports with the base path

use crate::common::geometry::{distance, planar_distance};
use crate::common::messages::{Pose, TrafficLight, Waypoint};
use crate::common::types::{Point, StopLine};
use crate::config::PerceptionConfig;
use crate::navigation::locator::PathLocator;
use std::cmp::Ordering;
use tracing::{debug, trace};

/// The stop the vehicle is approaching and the signal that controls it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    /// Base path index closest to the stop-line
    pub stop_index: usize,
    pub light: TrafficLight,
}

/// Picks the nearest upcoming stop-line and pairs it with a live signal
#[derive(Debug, Clone)]
pub struct StopLineCorrelator {
    stop_lines: Vec<StopLine>,
    config: PerceptionConfig,
    locator: PathLocator,
}

impl StopLineCorrelator {
    pub fn new(stop_lines: Vec<StopLine>, config: PerceptionConfig) -> Self {
        StopLineCorrelator {
            stop_lines,
            config,
            locator: PathLocator::new(),
        }
    }

    pub fn stop_lines(&self) -> &[StopLine] {
        &self.stop_lines
    }

    pub fn set_config(&mut self, config: PerceptionConfig) {
        self.config = config;
    }

    /// Forget where the vehicle was last seen on the path
    pub fn reset(&mut self) {
        self.locator.reset();
    }

    /// Find the stop the vehicle must respect next, if a signal controls it.
    ///
    /// When nothing correlates the vehicle locator is reset, since losing the
    /// signal means its position on the path may be stale as well.
    pub fn correlate(
        &mut self,
        pose: &Pose,
        path: &[Waypoint],
        lights: &[TrafficLight],
    ) -> Option<Correlation> {
        let correlation = self.find(pose, path, lights);
        if correlation.is_none() {
            self.locator.reset();
        }
        correlation
    }

    fn find(&mut self, pose: &Pose, path: &[Waypoint], lights: &[TrafficLight]) -> Option<Correlation> {
        let num_waypoints = path.len();
        let car_index = self.locator.locate(path, pose)?;
        trace!(car_index, "Closest car waypoint");

        let stop_index = self.nearest_stop_line(pose, path, car_index)?;

        // the light must sit past the stop-line along the direction of travel.
        // Comparing against the point two indices on is only approximate and
        // can misfire on sharp curves or sparse waypoints.
        let line_point = path[stop_index].position();
        let line_point_next = path[(stop_index + 2) % num_waypoints].position();

        let light = lights
            .iter()
            .filter_map(|light| {
                let position = &light.pose.position;
                let dist_light = distance(position, line_point);
                if dist_light >= self.config.light_match_radius {
                    return None;
                }
                let dist_light_next = distance(position, line_point_next);
                trace!(dist_light, dist_light_next, "Candidate light");
                (dist_light_next < dist_light).then_some((dist_light, light))
            })
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
            .map(|(_, light)| *light)?;

        debug!(
            stop_index,
            state = light.state.as_str(),
            "Correlated signal with stop-line"
        );
        Some(Correlation { stop_index, light })
    }

    /// Closest aligned stop-line within the forward horizon of `car_index`.
    ///
    /// The horizon counts path indices ahead of the vehicle, wrapping at the
    /// end of the path, rather than absolute indices from the path origin.
    fn nearest_stop_line(&self, pose: &Pose, path: &[Waypoint], car_index: usize) -> Option<usize> {
        let num_waypoints = path.len();
        let mut best: Option<(usize, usize)> = None;

        for &(x, y) in &self.stop_lines {
            let line = Point::new(x, y, pose.position.z);

            // skip the path search for stop-lines that are far away
            if planar_distance(&line, &pose.position) > self.config.stop_line_search_radius {
                continue;
            }

            let (wp, dist) = match PathLocator::nearest(path, &line) {
                Some(found) => found,
                None => continue,
            };
            trace!(wp, dist, x, y, "Closest waypoint for stop-line");

            let ahead = (wp + num_waypoints - car_index) % num_waypoints;
            if dist < self.config.stop_line_tolerance
                && ahead < self.config.stop_line_horizon
                && best.map_or(true, |(closest, _)| ahead < closest)
            {
                best = Some((ahead, wp));
            }
        }

        best.map(|(_, wp)| wp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::LightState;

    fn straight(count: usize) -> Vec<Waypoint> {
        (0..count)
            .map(|i| Waypoint::new(i as f64, 0.0, 0.0, 0.0))
            .collect()
    }

    fn correlator(stop_lines: Vec<StopLine>) -> StopLineCorrelator {
        StopLineCorrelator::new(stop_lines, PerceptionConfig::default())
    }

    #[test]
    fn pairs_stop_line_with_light_past_it() {
        let path = straight(300);
        let mut correlator = correlator(vec![(40.2, 0.3)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        let lights = [TrafficLight::new(45.0, 4.0, 5.0, LightState::Red)];

        let found = correlator.correlate(&pose, &path, &lights).unwrap();
        assert_eq!(found.stop_index, 40);
        assert_eq!(found.light.state, LightState::Red);
    }

    #[test]
    fn no_light_within_match_radius_means_no_stop() {
        let path = straight(300);
        let mut correlator = correlator(vec![(40.0, 0.0)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        let lights = [TrafficLight::new(95.0, 0.0, 0.0, LightState::Red)];
        assert!(correlator.correlate(&pose, &path, &lights).is_none());
    }

    #[test]
    fn light_before_the_stop_line_is_rejected() {
        let path = straight(300);
        let mut correlator = correlator(vec![(40.0, 0.0)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        let lights = [TrafficLight::new(30.0, 3.0, 0.0, LightState::Red)];
        assert!(correlator.correlate(&pose, &path, &lights).is_none());
    }

    #[test]
    fn misaligned_stop_line_is_ignored() {
        let path = straight(300);
        let mut correlator = correlator(vec![(40.0, 1.5)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        let lights = [TrafficLight::new(45.0, 4.0, 0.0, LightState::Red)];
        assert!(correlator.correlate(&pose, &path, &lights).is_none());
    }

    #[test]
    fn nearest_upcoming_stop_line_wins() {
        let path = straight(300);
        let mut correlator = correlator(vec![(120.0, 0.0), (60.0, 0.0), (5.0, 0.0)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        let lights = [
            TrafficLight::new(125.0, 3.0, 0.0, LightState::Green),
            TrafficLight::new(64.0, 3.0, 0.0, LightState::Red),
        ];
        let found = correlator.correlate(&pose, &path, &lights).unwrap();
        assert_eq!(found.stop_index, 60);
        assert_eq!(found.light.state, LightState::Red);
    }

    #[test]
    fn nearest_qualifying_light_wins() {
        let path = straight(300);
        let mut correlator = correlator(vec![(60.0, 0.0)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        let lights = [
            TrafficLight::new(80.0, 3.0, 0.0, LightState::Green),
            TrafficLight::new(63.0, 3.0, 0.0, LightState::Red),
        ];
        let found = correlator.correlate(&pose, &path, &lights).unwrap();
        assert_eq!(found.light.state, LightState::Red);
    }

    #[test]
    fn stop_lines_past_the_horizon_or_radius_are_ignored() {
        let path = straight(400);
        let pose = Pose::from_xy_yaw(0.0, 0.0, 0.0);
        let lights = [TrafficLight::new(175.0, 3.0, 0.0, LightState::Red)];

        // within the search radius but 170 indices ahead
        let mut correlator = StopLineCorrelator::new(
            vec![(170.0, 0.0)],
            PerceptionConfig {
                stop_line_search_radius: 300.0,
                ..PerceptionConfig::default()
            },
        );
        assert!(correlator.correlate(&pose, &path, &lights).is_none());

        // horizon is wide enough but the radius prunes it
        let mut correlator = StopLineCorrelator::new(
            vec![(170.0, 0.0)],
            PerceptionConfig {
                stop_line_horizon: 300,
                ..PerceptionConfig::default()
            },
        );
        assert!(correlator.correlate(&pose, &path, &lights).is_some());
        let mut correlator = StopLineCorrelator::new(
            vec![(170.0, 0.0)],
            PerceptionConfig {
                stop_line_horizon: 300,
                stop_line_search_radius: 150.0,
                ..PerceptionConfig::default()
            },
        );
        assert!(correlator.correlate(&pose, &path, &lights).is_none());
    }

    #[test]
    fn horizon_is_measured_from_the_vehicle_and_wraps() {
        let path = straight(200);
        let mut correlator = correlator(vec![(3.0, 0.0)]);
        let pose = Pose::from_xy_yaw(190.0, 0.0, 0.0);
        let lights = [TrafficLight::new(8.0, 2.0, 0.0, LightState::Red)];
        // index 3 is 13 waypoints ahead of 190 on the loop, but 187 away in space
        let mut wide = StopLineCorrelator::new(
            vec![(3.0, 0.0)],
            PerceptionConfig {
                stop_line_search_radius: 250.0,
                ..PerceptionConfig::default()
            },
        );
        assert_eq!(wide.correlate(&pose, &path, &lights).unwrap().stop_index, 3);
        // default radius of 200 keeps it too
        assert_eq!(correlator.correlate(&pose, &path, &lights).unwrap().stop_index, 3);
    }

    #[test]
    fn stop_lines_beyond_index_150_are_accepted_when_close_ahead() {
        let path = straight(400);
        let mut correlator = correlator(vec![(260.0, 0.0)]);
        let pose = Pose::from_xy_yaw(200.0, 0.0, 0.0);
        let lights = [TrafficLight::new(265.0, 3.0, 0.0, LightState::Red)];
        assert_eq!(correlator.correlate(&pose, &path, &lights).unwrap().stop_index, 260);
    }

    #[test]
    fn losing_the_signal_resets_the_vehicle_locator() {
        let path = straight(300);
        let mut correlator = correlator(vec![(40.0, 0.0)]);
        let pose = Pose::from_xy_yaw(10.0, 0.0, 0.0);
        assert!(correlator.correlate(&pose, &path, &[]).is_none());
        assert_eq!(correlator.locator.last_index(), None);

        let lights = [TrafficLight::new(44.0, 3.0, 0.0, LightState::Red)];
        assert!(correlator.correlate(&pose, &path, &lights).is_some());
        assert_eq!(correlator.locator.last_index(), Some(10));
    }
}
