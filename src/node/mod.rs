//! Planner node: message callbacks and the fixed-rate planning loop
pub mod bridge;
pub mod publisher;

use self::publisher::Publisher;
use crate::common::messages::{
    CameraImage, Header, Lane, LightState, Pose, TrafficLight, TrafficWaypoint, Waypoint,
};
use crate::common::types::StopIndex;
use crate::common::CoreError;
use crate::config::{rate_period, NodeConfig};
use crate::navigation::PlanningStack;
use crate::perception::classifier::LightClassifier;
use crate::perception::stop_lines::Correlation;
use crate::perception::PerceptionStack;
use crate::WaypointCore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const PUBLISHER_CAPACITY: usize = 16;

/// Wall-clock time in seconds since the Unix epoch
fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

/// Owns the planning and perception state and drives both.
///
/// Callbacks may run concurrently with the planning tick; every mutation of
/// the stacks goes through the `core` lock. The classifier runs without any
/// lock held.
pub struct PlannerNode {
    core: Mutex<WaypointCore>,
    classifier: Arc<dyn LightClassifier>,
    current_pose: Mutex<Option<Pose>>,
    lights: Mutex<Vec<TrafficLight>>,
    frame_generation: AtomicU64,
    applied_generation: AtomicU64,
    lane_seq: AtomicU64,
    rate_hz: f64,
    period: Duration,
    classifier_timeout: Duration,
    final_waypoints_pub: Publisher<Lane>,
    traffic_waypoint_pub: Publisher<TrafficWaypoint>,
}

impl PlannerNode {
    /// Build and activate the node. Fails on invalid parameters, an unusable
    /// loop rate or missing stop-lines.
    pub fn new(
        config: &NodeConfig,
        classifier: Arc<dyn LightClassifier>,
    ) -> Result<Arc<Self>, CoreError> {
        let period = rate_period(config.rate_hz)?;

        let mut planning = PlanningStack::new();
        planning.configure(&config.planner)?;

        let mut perception = PerceptionStack::new(config.stop_lines());
        perception.configure(&config.perception)?;

        let mut core = WaypointCore::new();
        core.register(planning);
        core.register(perception);
        core.init()?;

        info!(
            "Planner node ready: {} stop-lines, {} Hz, classifier {}",
            config.stop_line_positions.len(),
            config.rate_hz,
            classifier.name()
        );

        Ok(Arc::new(PlannerNode {
            core: Mutex::new(core),
            classifier,
            current_pose: Mutex::new(None),
            lights: Mutex::new(Vec::new()),
            frame_generation: AtomicU64::new(0),
            applied_generation: AtomicU64::new(0),
            lane_seq: AtomicU64::new(0),
            rate_hz: config.rate_hz,
            period,
            classifier_timeout: Duration::from_millis(config.classifier_timeout_ms),
            final_waypoints_pub: Publisher::new("/final_waypoints", PUBLISHER_CAPACITY),
            traffic_waypoint_pub: Publisher::new("/traffic_waypoint", PUBLISHER_CAPACITY),
        }))
    }

    pub fn subscribe_final_waypoints(&self) -> tokio::sync::broadcast::Receiver<Lane> {
        self.final_waypoints_pub.subscribe()
    }

    pub fn subscribe_traffic_waypoint(&self) -> tokio::sync::broadcast::Receiver<TrafficWaypoint> {
        self.traffic_waypoint_pub.subscribe()
    }

    pub fn pose_callback(&self, pose: Pose) {
        *self.current_pose.lock() = Some(pose);
    }

    /// Replace the base path; both stacks forget where the vehicle was
    pub fn waypoints_callback(&self, waypoints: Vec<Waypoint>) {
        let mut core = self.core.lock();
        if let Some(planning) = core.planning_stack_mut() {
            planning.set_base_waypoints(waypoints);
        }
        if let Some(perception) = core.perception_stack_mut() {
            perception.reset_tracking();
        }
    }

    pub fn velocity_callback(&self, linear_speed: f64) {
        let mut core = self.core.lock();
        if let Some(planning) = core.planning_stack_mut() {
            planning.set_current_speed(linear_speed);
        }
    }

    pub fn traffic_lights_callback(&self, lights: Vec<TrafficLight>) {
        *self.lights.lock() = lights;
    }

    /// Stable stop index produced by an external detector
    pub fn traffic_waypoint_callback(&self, msg: TrafficWaypoint) {
        let mut core = self.core.lock();
        if let Some(planning) = core.planning_stack_mut() {
            let num_waypoints = planning.base_waypoints().map_or(0, |path| path.len());
            let stop_index = match msg.stop_index() {
                Some(index) if index >= num_waypoints => {
                    warn!(
                        "Ignoring traffic waypoint {} outside a path of {} waypoints",
                        index, num_waypoints
                    );
                    None
                }
                other => other,
            };
            planning.set_traffic_waypoint(stop_index);
        }
    }

    /// Classify a camera frame and publish the stable stop index.
    ///
    /// If the classifier fails or times out the previous stable index is
    /// published again. A result that arrives after a newer frame has
    /// already been applied is dropped.
    pub async fn image_callback(&self, image: CameraImage) -> TrafficWaypoint {
        let generation = self.frame_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (stop_index, state) = match self.correlate() {
            Some(correlation) => match self.classify(image, correlation.light.state).await {
                Ok(state) => (Some(correlation.stop_index), state),
                Err(e) => {
                    warn!("Reusing last stable signal state: {}", e);
                    return self.republish();
                }
            },
            None => (None, LightState::Unknown),
        };

        self.apply_observation(generation, stop_index, state)
    }

    fn correlate(&self) -> Option<Correlation> {
        let pose = (*self.current_pose.lock())?;
        let lights = self.lights.lock().clone();

        let mut core = self.core.lock();
        let path = core.planning_stack_mut()?.base_waypoints()?;
        core.perception_stack_mut()?.correlate(&pose, &path, &lights)
    }

    async fn classify(&self, image: CameraImage, hint: LightState) -> Result<LightState, CoreError> {
        let classifier = Arc::clone(&self.classifier);
        let task = tokio::task::spawn_blocking(move || classifier.classify(&image, hint));

        match tokio::time::timeout(self.classifier_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CoreError::Classifier(join_error.to_string())),
            Err(_) => Err(CoreError::ClassifierTimeout(
                self.classifier_timeout.as_millis() as u64,
            )),
        }
    }

    fn apply_observation(
        &self,
        generation: u64,
        stop_index: StopIndex,
        state: LightState,
    ) -> TrafficWaypoint {
        let mut core = self.core.lock();
        if generation <= self.applied_generation.load(Ordering::SeqCst) {
            debug!(generation, "Dropping stale classification");
            let stable = core
                .perception_stack_mut()
                .and_then(|perception| perception.stable_stop_index());
            return TrafficWaypoint::from(stable);
        }
        self.applied_generation.store(generation, Ordering::SeqCst);

        let stable = match core.perception_stack_mut() {
            Some(perception) => perception.debounce(stop_index, state),
            None => None,
        };
        if let Some(planning) = core.planning_stack_mut() {
            planning.set_traffic_waypoint(stable);
        }
        drop(core);

        let msg = TrafficWaypoint::from(stable);
        self.traffic_waypoint_pub.publish(msg);
        msg
    }

    fn republish(&self) -> TrafficWaypoint {
        let stable = self
            .core
            .lock()
            .perception_stack_mut()
            .and_then(|perception| perception.stable_stop_index());
        let msg = TrafficWaypoint::from(stable);
        self.traffic_waypoint_pub.publish(msg);
        msg
    }

    /// One planning tick. `None` when the node is not ready yet.
    pub fn timer_callback(&self) -> Option<Lane> {
        let pose = match *self.current_pose.lock() {
            Some(pose) => pose,
            None => {
                debug!("No pose yet, skipping tick");
                return None;
            }
        };

        let waypoints = {
            let mut core = self.core.lock();
            let planning = core.planning_stack_mut()?;
            match planning.plan(&pose) {
                Some(waypoints) => waypoints,
                None => {
                    debug!("Base path not loaded yet, skipping tick");
                    return None;
                }
            }
        };

        let lane = Lane {
            header: Header {
                seq: self.lane_seq.fetch_add(1, Ordering::SeqCst),
                stamp: now_secs(),
                frame_id: "/world".to_string(),
            },
            waypoints,
        };
        self.final_waypoints_pub.publish(lane.clone());
        Some(lane)
    }

    /// Run the planning loop until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Planning loop started at {} Hz", self.rate_hz);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.timer_callback();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Planning loop stopped");
    }

    /// Deactivate and clean up both stacks
    pub fn shutdown(&self) -> Result<(), CoreError> {
        self.core.lock().shutdown()
    }

    pub fn stable_stop_index(&self) -> StopIndex {
        self.core
            .lock()
            .perception_stack_mut()
            .and_then(|perception| perception.stable_stop_index())
    }

    pub fn is_braking(&self) -> bool {
        self.core
            .lock()
            .planning_stack_mut()
            .map_or(false, |planning| planning.is_braking())
    }

    /// Path index found on the last planning tick
    pub fn last_index(&self) -> Option<usize> {
        self.core
            .lock()
            .planning_stack_mut()
            .and_then(|planning| planning.last_index())
    }
}
