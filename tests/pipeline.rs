//! End-to-end tests of the planner node: signal reports in, trajectories out

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use waypoint_core::common::messages::{
    CameraImage, LightState, Pose, TrafficLight, TrafficWaypoint, Waypoint,
};
use waypoint_core::common::CoreError;
use waypoint_core::config::NodeConfig;
use waypoint_core::node::PlannerNode;
use waypoint_core::perception::classifier::{GroundTruthClassifier, LightClassifier};

const STOP_INDEX: usize = 5;

fn straight_road(count: usize) -> Vec<Waypoint> {
    (0..count)
        .map(|i| Waypoint::new(i as f64, 0.0, 0.0, 0.0))
        .collect()
}

/// Signal just past the stop-line at index 5, off to the side of the road
fn signal(state: LightState) -> TrafficLight {
    TrafficLight::new(15.0, 3.0, 0.0, state)
}

fn test_config() -> NodeConfig {
    let mut config = NodeConfig::new(vec![(STOP_INDEX as f64, 0.0)]);
    config.planner.insert("max_speed".to_string(), 10.0);
    config
}

fn ready_node(config: &NodeConfig, classifier: Arc<dyn LightClassifier>) -> Arc<PlannerNode> {
    let node = PlannerNode::new(config, classifier).unwrap();
    node.waypoints_callback(straight_road(30));
    node.pose_callback(Pose::from_xy_yaw(0.0, 0.0, 0.0));
    node
}

async fn frames(node: &PlannerNode, count: usize) -> Vec<TrafficWaypoint> {
    let mut out = Vec::new();
    for _ in 0..count {
        out.push(node.image_callback(CameraImage::default()).await);
    }
    out
}

/// Sleeps on every call once `slow` is set
struct SlowClassifier {
    slow: AtomicBool,
    delay: Duration,
}

impl LightClassifier for SlowClassifier {
    fn name(&self) -> &str {
        "SlowClassifier"
    }

    fn classify(&self, _image: &CameraImage, hint: LightState) -> Result<LightState, CoreError> {
        if self.slow.load(Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        Ok(hint)
    }
}

/// Fails every call
struct BrokenClassifier;

impl LightClassifier for BrokenClassifier {
    fn name(&self) -> &str {
        "BrokenClassifier"
    }

    fn classify(&self, _image: &CameraImage, _hint: LightState) -> Result<LightState, CoreError> {
        Err(CoreError::Classifier("model not loaded".to_string()))
    }
}

/// First call is slow and reports GREEN, every later call is instant
struct FirstCallLags {
    calls: AtomicUsize,
    entered: AtomicBool,
}

impl LightClassifier for FirstCallLags {
    fn name(&self) -> &str {
        "FirstCallLags"
    }

    fn classify(&self, _image: &CameraImage, hint: LightState) -> Result<LightState, CoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            return Ok(LightState::Green);
        }
        Ok(hint)
    }
}

#[test]
fn no_trajectory_before_pose_and_path() {
    let node = PlannerNode::new(&test_config(), Arc::new(GroundTruthClassifier)).unwrap();
    assert!(node.timer_callback().is_none());

    node.pose_callback(Pose::from_xy_yaw(0.0, 0.0, 0.0));
    assert!(node.timer_callback().is_none());

    node.waypoints_callback(straight_road(30));
    let lane = node.timer_callback().unwrap();
    assert_eq!(lane.waypoints.len(), 25);
    assert_eq!(lane.header.frame_id, "/world");
    assert!(lane.header.stamp > 0.0);
}

#[test]
fn invalid_speed_publishes_an_empty_lane_then_recovers() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));
    let mut lanes = node.subscribe_final_waypoints();

    node.velocity_callback(f64::INFINITY);
    let lane = node.timer_callback().unwrap();
    assert!(lane.waypoints.is_empty());
    assert!(lanes.try_recv().unwrap().waypoints.is_empty());

    node.velocity_callback(3.0);
    let lane = node.timer_callback().unwrap();
    assert_eq!(lane.waypoints.len(), 25);
    assert_eq!(lane.header.seq, 1);
    assert_eq!(lanes.try_recv().unwrap().waypoints.len(), 25);
}

#[test]
fn unusable_loop_rate_is_rejected() {
    let mut config = test_config();
    config.rate_hz = 1e-30;
    assert!(PlannerNode::new(&config, Arc::new(GroundTruthClassifier)).is_err());
}

#[test]
fn cruise_profile_reaches_the_limit() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));
    node.velocity_callback(0.0);
    let lane = node.timer_callback().unwrap();

    let speeds: Vec<f64> = lane.waypoints.iter().map(|wp| wp.speed).collect();
    assert_eq!(&speeds[..3], &[1.0, 2.0, 3.0]);
    assert!(speeds[9..].iter().all(|&speed| speed == 10.0));
    assert!(!node.is_braking());
}

#[tokio::test]
async fn confirmed_red_brakes_at_the_stop_line() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));
    let mut traffic_rx = node.subscribe_traffic_waypoint();
    node.traffic_lights_callback(vec![signal(LightState::Red)]);

    let published = frames(&node, 4).await;
    assert_eq!(
        published,
        vec![
            TrafficWaypoint::NONE,
            TrafficWaypoint::NONE,
            TrafficWaypoint::NONE,
            TrafficWaypoint(STOP_INDEX as i32),
        ]
    );
    assert_eq!(traffic_rx.try_recv().unwrap(), TrafficWaypoint::NONE);
    assert_eq!(node.stable_stop_index(), Some(STOP_INDEX));

    node.velocity_callback(10.0);
    let lane = node.timer_callback().unwrap();
    assert!(node.is_braking());
    assert_eq!(lane.waypoints[STOP_INDEX].speed, 0.0);
    assert!(lane.waypoints[STOP_INDEX - 1].speed < 10.0);
    assert!(lane.waypoints[STOP_INDEX..].iter().all(|wp| wp.speed == 0.0));
}

#[tokio::test]
async fn lone_red_frame_keeps_cruising() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));

    node.traffic_lights_callback(vec![signal(LightState::Green)]);
    frames(&node, 4).await;
    node.traffic_lights_callback(vec![signal(LightState::Red)]);
    frames(&node, 1).await;
    node.traffic_lights_callback(vec![signal(LightState::Green)]);
    let published = frames(&node, 5).await;

    assert!(published.iter().all(|&msg| msg == TrafficWaypoint::NONE));
    node.velocity_callback(10.0);
    node.timer_callback().unwrap();
    assert!(!node.is_braking());
}

#[tokio::test]
async fn distant_signal_is_not_correlated() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));
    node.traffic_lights_callback(vec![TrafficLight::new(5.0, 80.0, 0.0, LightState::Red)]);

    let published = frames(&node, 6).await;
    assert!(published.iter().all(|&msg| msg == TrafficWaypoint::NONE));
    assert_eq!(node.stable_stop_index(), None);
}

#[tokio::test]
async fn slow_classifier_republishes_the_last_stable_index() {
    let mut config = test_config();
    config.classifier_timeout_ms = 50;
    let classifier = Arc::new(SlowClassifier {
        slow: AtomicBool::new(false),
        delay: Duration::from_millis(300),
    });
    let node = ready_node(&config, classifier.clone());
    node.traffic_lights_callback(vec![signal(LightState::Red)]);
    frames(&node, 4).await;
    assert_eq!(node.stable_stop_index(), Some(STOP_INDEX));

    classifier.slow.store(true, Ordering::SeqCst);
    node.traffic_lights_callback(vec![signal(LightState::Green)]);
    let published = frames(&node, 2).await;
    assert_eq!(published, vec![TrafficWaypoint(STOP_INDEX as i32); 2]);
    assert_eq!(node.stable_stop_index(), Some(STOP_INDEX));
}

#[tokio::test]
async fn classifier_errors_do_not_change_the_output() {
    let node = ready_node(&test_config(), Arc::new(BrokenClassifier));
    node.traffic_lights_callback(vec![signal(LightState::Red)]);
    let published = frames(&node, 5).await;
    assert!(published.iter().all(|&msg| msg == TrafficWaypoint::NONE));
}

#[tokio::test]
async fn late_result_from_an_older_frame_is_dropped() {
    let mut config = test_config();
    config.classifier_timeout_ms = 1000;
    let classifier = Arc::new(FirstCallLags {
        calls: AtomicUsize::new(0),
        entered: AtomicBool::new(false),
    });
    let node = ready_node(&config, classifier.clone());
    node.traffic_lights_callback(vec![signal(LightState::Red)]);

    let lagging = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.image_callback(CameraImage::default()).await })
    };
    while !classifier.entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // newer frame overtakes the lagging one
    frames(&node, 1).await;
    lagging.await.unwrap();

    // had the stale GREEN been applied, the red run would restart here
    let published = frames(&node, 3).await;
    assert_eq!(published[2], TrafficWaypoint(STOP_INDEX as i32));
}

#[test]
fn external_traffic_waypoint_outside_the_path_is_ignored() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));
    node.velocity_callback(10.0);

    node.traffic_waypoint_callback(TrafficWaypoint(500));
    node.timer_callback().unwrap();
    assert!(!node.is_braking());

    node.traffic_waypoint_callback(TrafficWaypoint(STOP_INDEX as i32));
    node.timer_callback().unwrap();
    assert!(node.is_braking());
}

#[tokio::test]
async fn planning_loop_publishes_until_shutdown() {
    let node = ready_node(&test_config(), Arc::new(GroundTruthClassifier));
    let mut lanes = node.subscribe_final_waypoints();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let planner = Arc::clone(&node);
    let handle = tokio::spawn(async move { planner.run(shutdown_rx).await });

    let first = tokio::time::timeout(Duration::from_secs(1), lanes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.waypoints.len(), 25);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    node.shutdown().unwrap();
}
