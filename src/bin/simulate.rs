//! Offline closed-loop run: a vehicle drives a straight road towards a signal
//! that is red for a while and then turns green.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use waypoint_core::common::messages::{CameraImage, LightState, Pose, TrafficLight, Waypoint};
use waypoint_core::config::NodeConfig;
use waypoint_core::node::PlannerNode;
use waypoint_core::perception::classifier::GroundTruthClassifier;

const ROAD_LENGTH: usize = 300;
const STOP_LINE_X: f64 = 100.0;
const START_X: f64 = 40.0;
const RED_TICKS: usize = 300;
const TOTAL_TICKS: usize = 700;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("waypoint_core=warn,simulate=info")),
        )
        .init();

    info!("Initializing simulation...");

    let config = NodeConfig::new(vec![(STOP_LINE_X, 0.0)]);
    let dt = 1.0 / config.rate_hz;
    let node = PlannerNode::new(&config, Arc::new(GroundTruthClassifier))
        .context("failed to start planner node")?;

    let road: Vec<Waypoint> = (0..ROAD_LENGTH)
        .map(|i| Waypoint::new(i as f64, 0.0, 0.0, 0.0))
        .collect();
    node.waypoints_callback(road);

    let mut x = START_X;
    let mut speed = 0.0;
    let mut stopped_at: Option<f64> = None;

    for tick in 0..TOTAL_TICKS {
        let state = if tick < RED_TICKS {
            LightState::Red
        } else {
            LightState::Green
        };

        node.pose_callback(Pose::from_xy_yaw(x, 0.0, 0.0));
        node.velocity_callback(speed);
        node.traffic_lights_callback(vec![TrafficLight::new(STOP_LINE_X + 10.0, 5.0, 0.0, state)]);
        let traffic_wp = node.image_callback(CameraImage::default()).await;

        let lane = match node.timer_callback() {
            Some(lane) => lane,
            None => continue,
        };
        speed = lane.waypoints.first().map_or(0.0, |wp| wp.speed);
        x += speed * dt;

        if speed == 0.0 && stopped_at.is_none() {
            stopped_at = Some(x);
        }

        if tick % 20 == 0 {
            info!(
                tick,
                light = state.as_str(),
                traffic_wp = traffic_wp.0,
                braking = node.is_braking(),
                "x={:.2} speed={:.2}",
                x,
                speed
            );
        }
        if x >= (ROAD_LENGTH - 1) as f64 {
            info!(tick, "Reached the end of the road");
            break;
        }
    }

    match stopped_at {
        Some(stop_x) => info!(
            "Vehicle held {:.2} m before the stop-line",
            STOP_LINE_X - stop_x
        ),
        None => info!("Vehicle never came to a stop"),
    }
    info!("Final position x={:.2}", x);

    node.shutdown().context("failed to shut down planner node")?;
    Ok(())
}
