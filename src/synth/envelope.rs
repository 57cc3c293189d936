//! Multi-segment envelope generator
//!
//! Three segments joined by four breakpoint levels. With the usual levels
//! `[0, 1, s, 0]` the segments are attack, decay and release. An optional
//! sustain point holds the envelope at the start of a segment until
//! [`Envelope::release`] is called; without one the envelope free-runs to
//! completion.
//!
//! Segment lengths can change while the envelope runs. Progress through a
//! segment is kept as a fraction, so a new length changes the rate rather
//! than the position.

/// Number of segments
pub const SEGMENTS: usize = 3;

/// Shortest segment length in seconds
const MIN_SEGMENT_TIME: f64 = 1.0e-5;

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Segment envelope generator
#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f64,

    levels: [f64; SEGMENTS + 1],
    lengths: [f64; SEGMENTS],
    /// Segment curvature: 0 is linear, negative bends toward a fast start
    curve: f64,
    sustain_point: Option<usize>,

    // State
    segment: usize,
    progress: f64,
    start_level: f64,
    level: f64,
    released: bool,
}

impl Envelope {
    /// Create an envelope that is already finished
    pub fn new(sample_rate: f64, levels: [f64; SEGMENTS + 1], curve: f64) -> Self {
        Self {
            sample_rate,
            levels,
            lengths: [0.01, 0.1, 0.3],
            curve,
            sustain_point: None,
            segment: SEGMENTS,
            progress: 0.0,
            start_level: levels[SEGMENTS],
            level: levels[SEGMENTS],
            released: false,
        }
    }

    /// Hold at the start of `segment` until released
    pub fn with_sustain_point(mut self, segment: usize) -> Self {
        self.sustain_point = (segment < SEGMENTS).then_some(segment);
        self
    }

    /// Set all segment lengths in seconds
    pub fn set_lengths(&mut self, lengths: [f64; SEGMENTS]) {
        for (slot, length) in self.lengths.iter_mut().zip(lengths) {
            *slot = if length.is_finite() {
                length.max(MIN_SEGMENT_TIME)
            } else {
                MIN_SEGMENT_TIME
            };
        }
    }

    pub fn lengths(&self) -> [f64; SEGMENTS] {
        self.lengths
    }

    /// Restart from the first level
    pub fn reset(&mut self) {
        self.segment = 0;
        self.progress = 0.0;
        self.released = false;
        self.start_level = self.levels[0];
        self.level = self.levels[0];
    }

    /// Leave the sustain point, or skip ahead to the release segment from
    /// the current level. No-op without a sustain point or once done.
    pub fn release(&mut self) {
        let Some(sustain) = self.sustain_point else {
            return;
        };
        if self.released || self.is_done() {
            return;
        }
        self.released = true;
        if self.segment <= sustain {
            self.segment = sustain;
            self.progress = 0.0;
            self.start_level = self.level;
        }
    }

    /// All segments have run
    pub fn is_done(&self) -> bool {
        self.segment >= SEGMENTS
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        if self.is_done() {
            EnvelopeStage::Done
        } else if self.is_holding() {
            EnvelopeStage::Sustain
        } else if self.segment == 0 {
            EnvelopeStage::Attack
        } else if self.segment + 1 == SEGMENTS {
            EnvelopeStage::Release
        } else {
            EnvelopeStage::Decay
        }
    }

    fn is_holding(&self) -> bool {
        !self.released && self.sustain_point == Some(self.segment)
    }

    /// Generate the next envelope sample
    pub fn process(&mut self) -> f64 {
        if self.is_done() || self.is_holding() {
            return self.level;
        }

        self.progress += 1.0 / (self.lengths[self.segment] * self.sample_rate);

        if self.progress >= 1.0 {
            self.segment += 1;
            self.progress = 0.0;
            self.level = self.levels[self.segment];
            self.start_level = self.level;
        } else {
            let end = self.levels[self.segment + 1];
            self.level = self.start_level + (end - self.start_level) * shape(self.progress, self.curve);
        }

        self.level
    }
}

/// Curved interpolation of `t` in [0, 1]; 0 curvature is linear
fn shape(t: f64, curve: f64) -> f64 {
    if curve.abs() < 1.0e-6 {
        t
    } else {
        (1.0 - (curve * t).exp()) / (1.0 - curve.exp())
    }
}
