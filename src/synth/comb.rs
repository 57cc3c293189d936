//! Feedback/feedforward comb filter
//!
//! ```text
//! w[n] = x[n] + fb * w[n - D]
//! y[n] = w[n] + ff * w[n - D]
//! ```
//!
//! `D` is fractional and read with linear interpolation. The delay line is
//! allocated once for the longest delay, so retuning never allocates.

/// Longest supported delay in seconds
pub const MAX_DELAY_SECONDS: f64 = 0.5;
/// Largest feedback magnitude that keeps the loop stable
pub const MAX_FEEDBACK: f64 = 0.95;

/// Comb filter with a preallocated delay line
#[derive(Debug, Clone)]
pub struct CombFilter {
    sample_rate: f64,
    buffer: Vec<f64>,
    write_pos: usize,

    delay_samples: f64,
    feedforward: f64,
    feedback: f64,
}

impl CombFilter {
    pub fn new(sample_rate: f64) -> Self {
        let capacity = (MAX_DELAY_SECONDS * sample_rate).ceil() as usize + 2;
        Self {
            sample_rate,
            buffer: vec![0.0; capacity],
            write_pos: 0,
            delay_samples: 1.0,
            feedforward: 0.0,
            feedback: 0.0,
        }
    }

    /// Set the delay in seconds, limited to one sample up to the buffer length
    pub fn set_delay(&mut self, seconds: f64) {
        let max = (self.buffer.len() - 2) as f64;
        let samples = seconds * self.sample_rate;
        self.delay_samples = if samples.is_finite() {
            samples.clamp(1.0, max)
        } else {
            1.0
        };
    }

    pub fn delay_samples(&self) -> f64 {
        self.delay_samples
    }

    pub fn set_feedforward(&mut self, gain: f64) {
        self.feedforward = gain.clamp(-1.0, 1.0);
    }

    pub fn set_feedback(&mut self, gain: f64) {
        self.feedback = gain.clamp(-MAX_FEEDBACK, MAX_FEEDBACK);
    }

    /// Largest output magnitude for input within [-1, 1]:
    /// `(1 + |ff|) / (1 - |fb|)`
    pub fn peak_gain(&self) -> f64 {
        (1.0 + self.feedforward.abs()) / (1.0 - self.feedback.abs())
    }

    /// Clear the delay line
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Process one sample
    pub fn process(&mut self, input: f64) -> f64 {
        let delayed = self.read_delayed();
        let w = input + self.feedback * delayed;
        self.buffer[self.write_pos] = w;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        w + self.feedforward * delayed
    }

    fn read_delayed(&self) -> f64 {
        let len = self.buffer.len();
        let whole = self.delay_samples.floor();
        let frac = self.delay_samples - whole;
        let whole = whole as usize;

        let a = self.buffer[(self.write_pos + len - whole) % len];
        let b = self.buffer[(self.write_pos + len - whole - 1) % len];
        a + (b - a) * frac
    }
}
