//! Amplitude follower
//!
//! One-pole lowpass on the rectified signal. Used to meter each partial of
//! an additive voice for the visualizer and to detect when a voice has gone
//! silent.

use std::f64::consts::TAU;

/// Corner frequency of the smoothing filter in Hz
pub const FOLLOWER_CUTOFF: f64 = 10.0;

/// Envelope follower
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    coefficient: f64,
    value: f64,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            coefficient: 1.0 - (-TAU * FOLLOWER_CUTOFF / sample_rate).exp(),
            value: 0.0,
        }
    }

    /// Feed one sample and return the smoothed amplitude
    pub fn process(&mut self, input: f64) -> f64 {
        self.value += self.coefficient * (input.abs() - self.value);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Below `threshold`
    pub fn is_silent(&self, threshold: f64) -> bool {
        self.value < threshold
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
