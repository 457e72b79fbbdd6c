//! Message shapes exchanged between the planner, the detector and the outside world

use super::geometry;
use super::types::{Orientation, Point, StopIndex};
use serde::{Deserialize, Serialize};

/// Raw colour of a traffic signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightState {
    Red,
    Yellow,
    Green,
    Unknown,
}

impl Default for LightState {
    fn default() -> Self {
        LightState::Unknown
    }
}

impl LightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::Red => "RED",
            LightState::Yellow => "YELLOW",
            LightState::Green => "GREEN",
            LightState::Unknown => "UNKNOWN",
        }
    }
}

/// Position and heading in the map frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Orientation,
}

impl Pose {
    pub fn new(position: Point, orientation: Orientation) -> Self {
        Pose {
            position,
            orientation,
        }
    }

    /// Planar pose facing `yaw` radians from +x
    pub fn from_xy_yaw(x: f64, y: f64, yaw: f64) -> Self {
        Pose {
            position: Point::new(x, y, 0.0),
            orientation: Orientation::from_euler_angles(0.0, 0.0, yaw),
        }
    }

    pub fn yaw(&self) -> f64 {
        geometry::yaw(&self.orientation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::new(Point::origin(), Orientation::identity())
    }
}

/// A point of the reference path with its target speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub pose: Pose,
    /// Target speed in m/s
    pub speed: f64,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, z: f64, speed: f64) -> Self {
        Waypoint {
            pose: Pose::new(Point::new(x, y, z), Orientation::identity()),
            speed,
        }
    }

    pub fn position(&self) -> &Point {
        &self.pose.position
    }

    /// Copy of this waypoint carrying a new target speed
    pub fn with_speed(&self, speed: f64) -> Self {
        Waypoint {
            pose: self.pose,
            speed,
        }
    }
}

/// Live report of a signal's position and colour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficLight {
    pub pose: Pose,
    pub state: LightState,
}

impl TrafficLight {
    pub fn new(x: f64, y: f64, z: f64, state: LightState) -> Self {
        TrafficLight {
            pose: Pose::new(Point::new(x, y, z), Orientation::identity()),
            state,
        }
    }
}

/// Camera frame handed to the signal classifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraImage {
    pub width: u32,
    pub height: u32,
    /// Only `rgb8` and `bgr8` are understood by the bundled classifiers
    pub encoding: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub seq: u64,
    /// Publish time in seconds since the Unix epoch
    #[serde(default)]
    pub stamp: f64,
    pub frame_id: String,
}

/// The published trajectory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub header: Header,
    pub waypoints: Vec<Waypoint>,
}

/// Stable stop index on the wire, -1 when no stop is required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficWaypoint(pub i32);

impl TrafficWaypoint {
    pub const NONE: TrafficWaypoint = TrafficWaypoint(-1);

    pub fn stop_index(&self) -> StopIndex {
        usize::try_from(self.0).ok()
    }
}

impl From<StopIndex> for TrafficWaypoint {
    fn from(index: StopIndex) -> Self {
        match index.and_then(|i| i32::try_from(i).ok()) {
            Some(i) => TrafficWaypoint(i),
            None => TrafficWaypoint::NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_waypoint_maps_none_to_minus_one() {
        assert_eq!(TrafficWaypoint::from(None), TrafficWaypoint(-1));
        assert_eq!(TrafficWaypoint::from(Some(12)), TrafficWaypoint(12));
        assert_eq!(TrafficWaypoint(-1).stop_index(), None);
        assert_eq!(TrafficWaypoint(7).stop_index(), Some(7));
    }

    #[test]
    fn light_state_uses_uppercase_names() {
        let json = serde_json::to_string(&LightState::Red).unwrap();
        assert_eq!(json, "\"RED\"");
        let state: LightState = serde_json::from_str("\"GREEN\"").unwrap();
        assert_eq!(state, LightState::Green);
    }
}
