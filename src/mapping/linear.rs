//! Linear mapper implementation

use super::Mapper;

/// Highest 7-bit MIDI data value
pub const MIDI_MAX: f64 = 127.0;

/// Linear interpolation mapper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearMapper {
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
    clamp: bool,
}

impl LinearMapper {
    pub fn new(in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> Self {
        Self {
            in_min,
            in_max,
            out_min,
            out_max,
            clamp: true,
        }
    }

    /// Map a 7-bit controller value onto `[out_min, out_max]`
    pub fn midi(out_min: f64, out_max: f64) -> Self {
        Self::new(0.0, MIDI_MAX, out_min, out_max)
    }

    /// Set whether to clamp output to range
    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn output_range(&self) -> (f64, f64) {
        (self.out_min, self.out_max)
    }
}

impl Mapper for LinearMapper {
    fn map(&self, input: f64) -> f64 {
        let in_range = self.in_max - self.in_min;
        let normalized = if in_range.abs() < f64::EPSILON {
            0.5
        } else {
            (input - self.in_min) / in_range
        };

        let output = self.out_min + normalized * (self.out_max - self.out_min);

        if self.clamp {
            output.clamp(self.out_min.min(self.out_max), self.out_min.max(self.out_max))
        } else {
            output
        }
    }
}
