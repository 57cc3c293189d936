//! Equal-power stereo panning

use std::f64::consts::FRAC_PI_4;

/// Left and right gains for a position in [-1, 1]. The summed power is
/// constant across the field.
pub fn pan_gains(position: f64) -> (f64, f64) {
    let angle = (position.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Pan a mono sample
pub fn pan(sample: f64, position: f64) -> (f64, f64) {
    let (left, right) = pan_gains(position);
    (sample * left, sample * right)
}

/// Panner holding gains for one position, recomputed only when it moves
#[derive(Debug, Clone)]
pub struct Panner {
    position: f64,
    left: f64,
    right: f64,
}

impl Panner {
    pub fn new() -> Self {
        let (left, right) = pan_gains(0.0);
        Self {
            position: 0.0,
            left,
            right,
        }
    }

    pub fn set_position(&mut self, position: f64) {
        if position != self.position {
            self.position = position;
            (self.left, self.right) = pan_gains(position);
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Split a mono sample into left and right
    pub fn process(&self, sample: f64) -> (f64, f64) {
        (sample * self.left, sample * self.right)
    }
}

impl Default for Panner {
    fn default() -> Self {
        Self::new()
    }
}
