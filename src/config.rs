//! Parameters for the planning and perception stacks and the node configuration file

use crate::common::messages::{Pose, Waypoint};
use crate::common::types::StopLine;
use crate::common::CoreError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// km/h to m/s
pub const KPH_MPS: f64 = 0.277778;

fn positive(name: &str, value: f64) -> Result<f64, CoreError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::invalid(name, "must be positive"));
    }
    Ok(value)
}

fn count(name: &str, value: f64, max: usize) -> Result<usize, CoreError> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(CoreError::invalid(name, "must be a positive integer"));
    }
    if value > max as f64 {
        return Err(CoreError::invalid(name, &format!("must not exceed {}", max)));
    }
    Ok(value as usize)
}

/// Upper bound on waypoints published per trajectory
pub const MAX_LOOKAHEAD_WPS: usize = 10_000;
/// Upper bound on confirmations the debouncer may require
pub const MAX_STATE_COUNT_THRESHOLD: usize = 1_000;
/// Upper bound on the stop-line horizon, in path indices
pub const MAX_STOP_LINE_HORIZON: usize = 1_000_000;
/// Planning loop rate limits in Hz
pub const MIN_RATE_HZ: f64 = 0.1;
pub const MAX_RATE_HZ: f64 = 1_000.0;

/// Tick period for a loop running at `rate_hz`
pub fn rate_period(rate_hz: f64) -> Result<Duration, CoreError> {
    if !rate_hz.is_finite() || !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&rate_hz) {
        return Err(CoreError::invalid(
            "rate_hz",
            &format!("must lie within [{}, {}]", MIN_RATE_HZ, MAX_RATE_HZ),
        ));
    }
    Ok(Duration::from_secs_f64(1.0 / rate_hz))
}

/// Trajectory generation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Number of waypoints published per trajectory
    pub lookahead_wps: usize,
    /// Speed limit in m/s
    pub max_speed: f64,
    /// Speed gained per waypoint while cruising
    pub accel: f64,
    /// Braking distance expressed in seconds of travel at `max_speed`
    pub braking_distance_multiplier: f64,
    pub creep_speed: f64,
    /// Distance from the stop line under which the vehicle stops creeping
    pub stop_distance: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            lookahead_wps: 25,
            max_speed: 20.0 * KPH_MPS,
            accel: 1.0,
            braking_distance_multiplier: 7.2,
            creep_speed: 5.0 * KPH_MPS,
            stop_distance: 5.0,
        }
    }
}

impl PlannerConfig {
    pub fn braking_distance(&self) -> f64 {
        self.braking_distance_multiplier * self.max_speed
    }

    /// Configure the planner with parameters
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<(), CoreError> {
        for (name, &value) in params {
            match name.as_str() {
                "lookahead_wps" => self.lookahead_wps = count(name, value, MAX_LOOKAHEAD_WPS)?,
                "max_speed" => self.max_speed = positive(name, value)?,
                "velocity_kph" => self.max_speed = positive(name, value)? * KPH_MPS,
                "accel" => self.accel = positive(name, value)?,
                "braking_distance_multiplier" => {
                    self.braking_distance_multiplier = positive(name, value)?
                }
                "creep_speed" => self.creep_speed = positive(name, value)?,
                "stop_distance" => self.stop_distance = positive(name, value)?,
                _ => return Err(CoreError::UnknownParameter(name.clone())),
            }
        }

        if self.creep_speed > self.max_speed {
            return Err(CoreError::invalid(
                "creep_speed",
                "must not exceed the speed limit",
            ));
        }
        Ok(())
    }
}

/// Stop-line correlation and debouncing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptionConfig {
    /// Consecutive identical observations needed before a state is trusted
    pub state_count_threshold: usize,
    /// Stop-lines farther than this from the vehicle are not considered
    pub stop_line_search_radius: f64,
    /// Maximum stop-line to path distance for the two to count as aligned
    pub stop_line_tolerance: f64,
    /// How many path indices ahead of the vehicle a stop-line may lie
    pub stop_line_horizon: usize,
    /// Maximum signal to stop-line distance for the two to be paired
    pub light_match_radius: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        PerceptionConfig {
            state_count_threshold: 3,
            stop_line_search_radius: 200.0,
            stop_line_tolerance: 1.0,
            stop_line_horizon: 150,
            light_match_radius: 50.0,
        }
    }
}

impl PerceptionConfig {
    /// Configure the detector with parameters
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<(), CoreError> {
        for (name, &value) in params {
            match name.as_str() {
                "state_count_threshold" => {
                    self.state_count_threshold = count(name, value, MAX_STATE_COUNT_THRESHOLD)?
                }
                "stop_line_search_radius" => self.stop_line_search_radius = positive(name, value)?,
                "stop_line_tolerance" => self.stop_line_tolerance = positive(name, value)?,
                "stop_line_horizon" => {
                    self.stop_line_horizon = count(name, value, MAX_STOP_LINE_HORIZON)?
                }
                "light_match_radius" => self.light_match_radius = positive(name, value)?,
                _ => return Err(CoreError::UnknownParameter(name.clone())),
            }
        }
        Ok(())
    }
}

/// Which signal classifier the node loads at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Trust the state reported alongside the signal position
    #[default]
    GroundTruth,
    /// Vote on the dominant lit colour in the camera frame
    ColorVote,
}

fn default_rate_hz() -> f64 {
    10.0
}

fn default_classifier_timeout_ms() -> u64 {
    100
}

/// Contents of the node's YAML configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub planner: HashMap<String, f64>,
    #[serde(default)]
    pub perception: HashMap<String, f64>,
    #[serde(default)]
    pub stop_line_positions: Vec<[f64; 2]>,
    pub base_waypoints: Option<PathBuf>,
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    #[serde(default = "default_classifier_timeout_ms")]
    pub classifier_timeout_ms: u64,
    #[serde(default)]
    pub classifier: ClassifierKind,
}

impl NodeConfig {
    /// Default parameters for the given stop-lines, with no base path file
    pub fn new(stop_lines: Vec<StopLine>) -> Self {
        NodeConfig {
            planner: HashMap::new(),
            perception: HashMap::new(),
            stop_line_positions: stop_lines.into_iter().map(|(x, y)| [x, y]).collect(),
            base_waypoints: None,
            rate_hz: default_rate_hz(),
            classifier_timeout_ms: default_classifier_timeout_ms(),
            classifier: ClassifierKind::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let contents = fs::read_to_string(path)?;
        let config: NodeConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the node cannot start with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.stop_line_positions.is_empty() {
            return Err(CoreError::MissingConfig(
                "stop_line_positions is empty".to_string(),
            ));
        }
        if self.base_waypoints.is_none() {
            return Err(CoreError::MissingConfig(
                "base_waypoints path is not set".to_string(),
            ));
        }
        rate_period(self.rate_hz)?;
        if self.classifier_timeout_ms == 0 {
            return Err(CoreError::invalid(
                "classifier_timeout_ms",
                "must be positive",
            ));
        }
        PlannerConfig::default().configure(&self.planner)?;
        PerceptionConfig::default().configure(&self.perception)?;
        Ok(())
    }

    pub fn stop_lines(&self) -> Vec<StopLine> {
        self.stop_line_positions.iter().map(|p| (p[0], p[1])).collect()
    }
}

/// One row of the base waypoint file
#[derive(Debug, Clone, Copy, Deserialize)]
struct WaypointRecord {
    x: f64,
    y: f64,
    #[serde(default)]
    z: f64,
    #[serde(default)]
    yaw: f64,
    #[serde(default)]
    speed: f64,
}

/// Load the base path from a JSON array of `{x, y, z, yaw, speed}` records
pub fn load_base_waypoints(path: &Path) -> Result<Vec<Waypoint>, CoreError> {
    let contents = fs::read_to_string(path)?;
    parse_base_waypoints(&contents)
}

pub fn parse_base_waypoints(contents: &str) -> Result<Vec<Waypoint>, CoreError> {
    let records: Vec<WaypointRecord> = serde_json::from_str(contents)?;
    if records.is_empty() {
        return Err(CoreError::EmptyPath);
    }

    Ok(records
        .into_iter()
        .map(|r| {
            let mut pose = Pose::from_xy_yaw(r.x, r.y, r.yaw);
            pose.position.z = r.z;
            Waypoint { pose, speed: r.speed }
        })
        .collect())
}
