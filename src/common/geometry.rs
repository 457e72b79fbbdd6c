//! Planar geometry helpers shared by the locator, correlator and generator

use super::messages::Pose;
use super::types::{Orientation, Point};

/// Euclidean distance in 3D
pub fn distance(p1: &Point, p2: &Point) -> f64 {
    nalgebra::distance(p1, p2)
}

/// Euclidean distance ignoring altitude
pub fn planar_distance(p1: &Point, p2: &Point) -> f64 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    (dx * dx + dy * dy).sqrt()
}

/// Heading about +z
pub fn yaw(orientation: &Orientation) -> f64 {
    let (_, _, yaw) = orientation.euler_angles();
    yaw
}

/// Whether `point` lies behind a vehicle at `pose`.
///
/// The offset is rotated into the vehicle frame; a point exactly on the
/// lateral axis (or coincident with the vehicle) counts as ahead.
pub fn is_behind(pose: &Pose, point: &Point) -> bool {
    let yaw = pose.yaw();
    let shift_x = point.x - pose.position.x;
    let shift_y = point.y - pose.position.y;

    let x = shift_x * (-yaw).cos() - shift_y * (-yaw).sin();
    x < 0.0
}
