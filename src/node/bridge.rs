//! JSON-lines bridge between an external transport and the planner node

use super::PlannerNode;
use crate::common::messages::{CameraImage, Lane, Pose, TrafficLight, TrafficWaypoint, Waypoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// One inbound line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Pose { pose: Pose },
    Velocity { linear: f64 },
    BaseWaypoints { waypoints: Vec<Waypoint> },
    TrafficLights { lights: Vec<TrafficLight> },
    Image { image: CameraImage },
    TrafficWaypoint { index: i32 },
}

/// One outbound line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    FinalWaypoints { lane: Lane },
    TrafficWaypoint { index: i32 },
}

impl From<Lane> for OutboundMessage {
    fn from(lane: Lane) -> Self {
        OutboundMessage::FinalWaypoints { lane }
    }
}

impl From<TrafficWaypoint> for OutboundMessage {
    fn from(msg: TrafficWaypoint) -> Self {
        OutboundMessage::TrafficWaypoint { index: msg.0 }
    }
}

/// Parse one line; blank lines yield `None`, malformed ones are logged and skipped
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Skipping malformed message: {}", e);
            None
        }
    }
}

/// Hand a message to the matching callback.
///
/// Camera frames are classified on a separate task so slow classification
/// never holds up the reader.
pub fn dispatch(node: &Arc<PlannerNode>, msg: InboundMessage) {
    match msg {
        InboundMessage::Pose { pose } => node.pose_callback(pose),
        InboundMessage::Velocity { linear } => node.velocity_callback(linear),
        InboundMessage::BaseWaypoints { waypoints } => node.waypoints_callback(waypoints),
        InboundMessage::TrafficLights { lights } => node.traffic_lights_callback(lights),
        InboundMessage::TrafficWaypoint { index } => {
            node.traffic_waypoint_callback(TrafficWaypoint(index))
        }
        InboundMessage::Image { image } => {
            let node = Arc::clone(node);
            tokio::spawn(async move {
                node.image_callback(image).await;
            });
        }
    }
}
