//! Phase-accumulating oscillator

use std::f64::consts::TAU;

/// Waveform types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    /// Band-limited sum of the first `n` harmonics at equal amplitude
    Harmonics(u32),
    /// White noise (uniform random)
    WhiteNoise,
}

/// A basic oscillator that generates waveforms
pub struct Oscillator {
    waveform: Waveform,
    phase: f64,
    frequency: f64,
    sample_rate: f64,
    /// Harmonics below Nyquist at the current frequency
    audible_harmonics: u32,
    /// Simple RNG state (xorshift)
    rng_state: u64,
}

impl Oscillator {
    /// Create a new oscillator
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        let mut osc = Self {
            waveform,
            phase: 0.0,
            frequency,
            sample_rate,
            audible_harmonics: 1,
            rng_state: 0x2545_f491_4f6c_dd1d,
        };
        osc.set_frequency(frequency);
        osc
    }

    /// Seed the noise generator. Zero seeds are replaced.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_state = seed.max(1);
        self
    }

    /// Set the frequency
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        if let Waveform::Harmonics(count) = self.waveform {
            let nyquist = self.sample_rate / 2.0;
            let below = if frequency > 0.0 {
                (nyquist / frequency).floor().min(count as f64) as u32
            } else {
                count
            };
            self.audible_harmonics = below.max(1);
        }
    }

    /// Get the current frequency
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Reset the phase
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Generate the next sample
    pub fn generate(&mut self) -> f64 {
        let sample = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Harmonics(_) => self.harmonics(),
            Waveform::WhiteNoise => self.random(),
        };

        self.phase += self.frequency / self.sample_rate;
        self.phase -= self.phase.floor();

        sample
    }

    fn harmonics(&self) -> f64 {
        let count = self.audible_harmonics;
        let sum: f64 = (1..=count)
            .map(|k| (self.phase * TAU * k as f64).sin())
            .sum();
        sum / count as f64
    }

    /// Xorshift RNG for noise generation
    fn random(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        // Convert to -1.0..1.0 range
        (x as f64 / u64::MAX as f64) * 2.0 - 1.0
    }
}
