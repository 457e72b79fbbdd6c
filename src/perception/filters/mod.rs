//! Temporal filters for perception output

use crate::common::messages::LightState;
use crate::common::types::StopIndex;
use tracing::debug;

/// A stateful filter over a stream of samples
pub trait Filter<T> {
    type Output;

    /// Feed one sample and get the filtered value
    fn filter(&mut self, input: T) -> Self::Output;

    /// Return to the initial state
    fn reset(&mut self);
}

/// One per-frame signal reading attached to the stop it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalObservation {
    pub stop_index: StopIndex,
    pub state: LightState,
}

impl SignalObservation {
    pub fn new(stop_index: StopIndex, state: LightState) -> Self {
        SignalObservation { stop_index, state }
    }

    /// Reading used when no signal could be correlated
    pub fn unknown() -> Self {
        SignalObservation {
            stop_index: None,
            state: LightState::Unknown,
        }
    }
}

/// Debounces raw signal states into a stable stop index.
///
/// A state is trusted once it has been confirmed `threshold` times after its
/// first sighting. Until then the previously committed stop index is
/// repeated, so a single misclassified frame never toggles braking.
#[derive(Debug, Clone)]
pub struct StateDebouncer {
    threshold: usize,
    state: LightState,
    state_count: usize,
    last_state: LightState,
    last_wp: StopIndex,
}

impl StateDebouncer {
    pub fn new(threshold: usize) -> Self {
        StateDebouncer {
            threshold,
            state: LightState::Unknown,
            state_count: 0,
            last_state: LightState::Unknown,
            last_wp: None,
        }
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Last committed state
    pub fn last_state(&self) -> LightState {
        self.last_state
    }

    /// Last committed stop index
    pub fn last_wp(&self) -> StopIndex {
        self.last_wp
    }
}

impl Filter<SignalObservation> for StateDebouncer {
    type Output = StopIndex;

    fn filter(&mut self, input: SignalObservation) -> StopIndex {
        if self.state != input.state {
            self.state_count = 0;
            self.state = input.state;
        } else if self.state_count >= self.threshold {
            if self.last_state != self.state {
                debug!(
                    "Signal state committed: {} -> {}",
                    self.last_state.as_str(),
                    self.state.as_str()
                );
            }
            self.last_state = self.state;
            self.last_wp = if self.state == LightState::Red {
                input.stop_index
            } else {
                None
            };
        }
        self.state_count += 1;
        self.last_wp
    }

    fn reset(&mut self) {
        *self = StateDebouncer::new(self.threshold);
    }
}
