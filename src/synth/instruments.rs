//! Instrument definitions
//!
//! Immutable, process-wide tables shared by every voice of an instrument:
//! the timbre model with its constants, the parameter defaults and the
//! playable range used by the visualizer.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::parameter::{Parameter, ParameterError, ParameterSpec, ParameterStore};
use super::pitch::{C2, C8};

/// Shortest time allowed in an envelope field
pub const MIN_ENVELOPE_TIME: f64 = 0.001;
/// Longest time allowed in an envelope field
pub const MAX_ENVELOPE_TIME: f64 = 2.0;

/// Largest virtual window dimension
const MAX_VISUAL_SIZE: f64 = 4096.0;

/// Lowest and highest note of the visualized range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayingRange {
    pub low: u8,
    pub high: u8,
}

impl PlayingRange {
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, note: u8) -> bool {
        (self.low..=self.high).contains(&note)
    }

    /// Number of semitones covered, never zero
    pub fn span(&self) -> f64 {
        (self.high.saturating_sub(self.low)).max(1) as f64
    }
}

/// Constants of the three-oscillator additive model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdditiveConstants {
    /// Divides hardness before it scales the overtones
    pub scale_hardness: f64,
    /// Divides the summed output
    pub scale_amplitude: f64,
    pub curve: f64,
    pub levels: [f64; 4],
}

/// Constants of the filtered-harmonics model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtractiveConstants {
    /// Partials in the source oscillator
    pub harmonics: u32,
    /// Share of white noise in the source
    pub noise_mix: f64,
    pub curve: f64,
    pub levels: [f64; 4],
    /// Segment the envelope holds at until note-off
    pub sustain_point: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimbreModel {
    Additive(AdditiveConstants),
    Subtractive(SubtractiveConstants),
}

/// Everything a voice needs to know about its instrument
#[derive(Debug)]
pub struct InstrumentDefinition {
    pub name: &'static str,
    pub model: TimbreModel,
    pub parameters: &'static [ParameterSpec],
    pub range: PlayingRange,
}

impl InstrumentDefinition {
    /// A fresh parameter store holding this instrument's defaults
    pub fn store(&self) -> Result<ParameterStore, ParameterError> {
        ParameterStore::from_specs(self.parameters)
    }

    /// Default table entry for a key
    pub fn spec(&self, key: Parameter) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.key == key)
    }
}

const ADDITIVE_LEVELS: [f64; 4] = [0.0, 1.0, 0.2, 0.0];

pub static MARIMBA: InstrumentDefinition = InstrumentDefinition {
    name: "marimba",
    model: TimbreModel::Additive(AdditiveConstants {
        scale_hardness: 4.0,
        scale_amplitude: 2.0,
        curve: 0.0,
        levels: ADDITIVE_LEVELS,
    }),
    parameters: &[
        ParameterSpec::new(Parameter::Hardness, 0.5, 0.0, 1.0),
        ParameterSpec::new(Parameter::Brightness, 0.6, 0.0, 1.0),
        ParameterSpec::new(Parameter::Amplitude, 0.8, 0.0, 1.0),
        ParameterSpec::new(Parameter::AttackTime, 0.015, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::DecayTime, 0.15, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::ReleaseTime, 1.5, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::Pan, 0.0, -1.0, 1.0),
        ParameterSpec::new(Parameter::VisualWidth, 1200.0, 0.0, MAX_VISUAL_SIZE),
        ParameterSpec::new(Parameter::VisualHeight, 600.0, 0.0, MAX_VISUAL_SIZE),
        ParameterSpec::new(Parameter::FirstOvertone, 4.0, 1.0, 16.0),
        ParameterSpec::new(Parameter::SecondOvertone, 10.0, 1.0, 32.0),
    ],
    range: PlayingRange::new(C2, C8),
};

pub static XYLOPHONE: InstrumentDefinition = InstrumentDefinition {
    name: "xylophone",
    model: TimbreModel::Additive(AdditiveConstants {
        scale_hardness: 4.0,
        scale_amplitude: 2.0,
        curve: 0.0,
        levels: ADDITIVE_LEVELS,
    }),
    parameters: &[
        ParameterSpec::new(Parameter::Hardness, 0.75, 0.0, 1.0),
        ParameterSpec::new(Parameter::Brightness, 0.25, 0.0, 1.0),
        ParameterSpec::new(Parameter::Amplitude, 0.8, 0.0, 1.0),
        ParameterSpec::new(Parameter::AttackTime, 0.01, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::DecayTime, 0.15, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::ReleaseTime, 1.5, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::Pan, 0.0, -1.0, 1.0),
        ParameterSpec::new(Parameter::VisualWidth, 1200.0, 0.0, MAX_VISUAL_SIZE),
        ParameterSpec::new(Parameter::VisualHeight, 600.0, 0.0, MAX_VISUAL_SIZE),
        ParameterSpec::new(Parameter::FirstOvertone, 3.0, 1.0, 16.0),
        ParameterSpec::new(Parameter::SecondOvertone, 6.0, 1.0, 32.0),
    ],
    range: PlayingRange::new(C2, C8),
};

pub static SUBTRACTIVE: InstrumentDefinition = InstrumentDefinition {
    name: "subtractive",
    model: TimbreModel::Subtractive(SubtractiveConstants {
        harmonics: 12,
        noise_mix: 0.1,
        curve: -3.0,
        levels: [0.0, 1.0, 0.3, 0.0],
        sustain_point: 2,
    }),
    parameters: &[
        ParameterSpec::new(Parameter::Amplitude, 0.8, 0.0, 1.0),
        ParameterSpec::new(Parameter::AttackTime, 0.005, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::DecayTime, 0.2, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::ReleaseTime, 1.5, MIN_ENVELOPE_TIME, MAX_ENVELOPE_TIME),
        ParameterSpec::new(Parameter::Pan, 0.0, -1.0, 1.0),
        ParameterSpec::new(Parameter::VisualWidth, 1200.0, 0.0, MAX_VISUAL_SIZE),
        ParameterSpec::new(Parameter::VisualHeight, 600.0, 0.0, MAX_VISUAL_SIZE),
        ParameterSpec::new(Parameter::Delay, 1.0, 0.25, 4.0),
        ParameterSpec::new(Parameter::Feedforward, 0.5, -1.0, 1.0),
        ParameterSpec::new(Parameter::Feedback, 0.5, -0.95, 0.95),
    ],
    range: PlayingRange::new(C2, C8),
};

/// Selectable instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    #[default]
    Marimba,
    Xylophone,
    Subtractive,
}

impl Instrument {
    pub fn definition(self) -> &'static InstrumentDefinition {
        match self {
            Instrument::Marimba => &MARIMBA,
            Instrument::Xylophone => &XYLOPHONE,
            Instrument::Subtractive => &SUBTRACTIVE,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition().name)
    }
}
