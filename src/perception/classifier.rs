//! Traffic signal colour classification

use crate::common::messages::{CameraImage, LightState};
use crate::common::CoreError;
use crate::config::ClassifierKind;
use std::sync::Arc;
use tracing::debug;

/// Turns a camera frame into a signal colour.
///
/// `hint` is the state reported alongside the signal position; real
/// classifiers may ignore it. Implementations can be slow and are called off
/// the planning loop.
pub trait LightClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, image: &CameraImage, hint: LightState) -> Result<LightState, CoreError>;
}

/// Create the classifier selected in the node configuration
pub fn load_classifier(kind: ClassifierKind) -> Result<Arc<dyn LightClassifier>, CoreError> {
    let classifier: Arc<dyn LightClassifier> = match kind {
        ClassifierKind::GroundTruth => Arc::new(GroundTruthClassifier),
        ClassifierKind::ColorVote => Arc::new(ColorVoteClassifier::new()),
    };
    debug!("Loaded {} classifier", classifier.name());
    Ok(classifier)
}

/// Reports the simulator-provided state unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundTruthClassifier;

impl LightClassifier for GroundTruthClassifier {
    fn name(&self) -> &str {
        "GroundTruthClassifier"
    }

    fn classify(&self, _image: &CameraImage, hint: LightState) -> Result<LightState, CoreError> {
        Ok(hint)
    }
}

/// Votes on the hue of bright, saturated pixels
#[derive(Debug, Clone)]
pub struct ColorVoteClassifier {
    /// Minimum V (0-255) for a pixel to count as lit
    min_value: f32,
    /// Minimum S (0-100) for a pixel to count as coloured
    min_saturation: f32,
    /// Share of lit pixels the winning colour needs
    min_fraction: f32,
    min_pixels: u32,
}

impl ColorVoteClassifier {
    pub fn new() -> Self {
        ColorVoteClassifier {
            min_value: 180.0,
            min_saturation: 50.0,
            min_fraction: 0.5,
            min_pixels: 20,
        }
    }

    fn hue_state(hue: f32) -> Option<LightState> {
        match hue {
            h if !(15.0..345.0).contains(&h) => Some(LightState::Red),
            h if (35.0..75.0).contains(&h) => Some(LightState::Yellow),
            h if (90.0..190.0).contains(&h) => Some(LightState::Green),
            _ => None,
        }
    }
}

impl Default for ColorVoteClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LightClassifier for ColorVoteClassifier {
    fn name(&self) -> &str {
        "ColorVoteClassifier"
    }

    fn classify(&self, image: &CameraImage, _hint: LightState) -> Result<LightState, CoreError> {
        let swap = match image.encoding.as_str() {
            "rgb8" => false,
            "bgr8" => true,
            other => {
                return Err(CoreError::Classifier(format!(
                    "unsupported encoding `{}`",
                    other
                )))
            }
        };
        let expected = image.width as usize * image.height as usize * 3;
        if image.data.len() != expected {
            return Err(CoreError::Classifier(format!(
                "expected {} bytes for a {}x{} frame, got {}",
                expected,
                image.width,
                image.height,
                image.data.len()
            )));
        }

        let mut lit = 0u32;
        let mut votes = [0u32; 3];
        for px in image.data.chunks_exact(3) {
            let (r, g, b) = if swap {
                (px[2], px[1], px[0])
            } else {
                (px[0], px[1], px[2])
            };
            let (h, s, v) = rgb_to_hsv(r as f32, g as f32, b as f32);
            if v < self.min_value || s < self.min_saturation {
                continue;
            }
            lit += 1;
            match Self::hue_state(h) {
                Some(LightState::Red) => votes[0] += 1,
                Some(LightState::Yellow) => votes[1] += 1,
                Some(LightState::Green) => votes[2] += 1,
                _ => {}
            }
        }

        let (winner, count) = [LightState::Red, LightState::Yellow, LightState::Green]
            .into_iter()
            .zip(votes)
            .max_by_key(|(_, count)| *count)
            .unwrap_or((LightState::Unknown, 0));

        if count < self.min_pixels || (count as f32) < self.min_fraction * lit as f32 {
            return Ok(LightState::Unknown);
        }
        Ok(winner)
    }
}

/// RGB to HSV with H in 0-360, S in 0-100 and V in 0-255
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let r_n = r / 255.0;
    let g_n = g / 255.0;
    let b_n = b / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;

    let h = if delta < 1e-6 {
        0.0
    } else if (max - r_n).abs() < 1e-6 {
        60.0 * (((g_n - b_n) / delta).rem_euclid(6.0))
    } else if (max - g_n).abs() < 1e-6 {
        60.0 * (((b_n - r_n) / delta) + 2.0)
    } else {
        60.0 * (((r_n - g_n) / delta) + 4.0)
    };

    let s = if max < 1e-6 { 0.0 } else { delta / max * 100.0 };
    (h, s, max * 255.0)
}
