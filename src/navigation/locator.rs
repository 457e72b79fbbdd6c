//! Locating the vehicle on the base path

use crate::common::geometry::{distance, is_behind};
use crate::common::messages::{Pose, Waypoint};
use crate::common::types::Point;

/// Finds the path index closest to the vehicle.
///
/// The first call scans the whole path. Later calls walk forward from the
/// previous result and stop as soon as the distance grows again, which is
/// only valid while the vehicle moves little between calls compared to the
/// waypoint spacing. A walk that improves for a full lap falls back to a
/// full scan.
#[derive(Debug, Clone, Default)]
pub struct PathLocator {
    old_nearest_point_index: Option<usize>,
}

impl PathLocator {
    pub fn new() -> Self {
        PathLocator {
            old_nearest_point_index: None,
        }
    }

    /// Index returned by the last call to `locate`
    pub fn last_index(&self) -> Option<usize> {
        self.old_nearest_point_index
    }

    /// Forget the seed so the next call scans the whole path
    pub fn reset(&mut self) {
        self.old_nearest_point_index = None;
    }

    /// Closest waypoint ahead of the vehicle, or `None` on an empty path
    pub fn locate(&mut self, path: &[Waypoint], pose: &Pose) -> Option<usize> {
        let num_waypoints = path.len();
        if num_waypoints == 0 {
            return None;
        }

        let position = &pose.position;
        let closest_index = match self.old_nearest_point_index {
            Some(seed) if seed < num_waypoints => {
                walk_forward(path, position, seed).unwrap_or_else(|| full_scan(path, position).0)
            }
            _ => full_scan(path, position).0,
        };

        let closest_index = if is_behind(pose, path[closest_index].position()) {
            (closest_index + 1) % num_waypoints
        } else {
            closest_index
        };

        self.old_nearest_point_index = Some(closest_index);
        Some(closest_index)
    }

    /// Closest waypoint to an arbitrary point together with its distance
    pub fn nearest(path: &[Waypoint], point: &Point) -> Option<(usize, f64)> {
        if path.is_empty() {
            return None;
        }
        Some(full_scan(path, point))
    }
}

fn full_scan(path: &[Waypoint], point: &Point) -> (usize, f64) {
    let mut ind_min = 0;
    let mut d_min = f64::MAX;
    for (i, waypoint) in path.iter().enumerate() {
        let d = distance(waypoint.position(), point);
        if d < d_min {
            d_min = d;
            ind_min = i;
        }
    }
    (ind_min, d_min)
}

/// Walk from `seed` until the distance stops shrinking. `None` when it never does.
fn walk_forward(path: &[Waypoint], point: &Point, seed: usize) -> Option<usize> {
    let num_waypoints = path.len();
    let mut ind_min = seed;
    let mut distance_this_index = distance(path[seed].position(), point);

    for step in 1..num_waypoints {
        let index = (seed + step) % num_waypoints;
        let distance_next_index = distance(path[index].position(), point);
        if distance_next_index >= distance_this_index {
            return Some(ind_min);
        }
        ind_min = index;
        distance_this_index = distance_next_index;
    }

    if num_waypoints == 1 {
        Some(seed)
    } else {
        None
    }
}
