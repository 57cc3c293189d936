//! Synthesis engine for mallet voices
//!
//! Contains the parameter store, pitch model, signal building blocks and
//! the two voice models.

pub mod additive;
pub mod comb;
pub mod envelope;
pub mod follower;
pub mod instruments;
pub mod oscillator;
pub mod pan;
pub mod parameter;
pub mod pitch;
pub mod subtractive;
pub mod voice;

pub use additive::AdditiveVoice;
pub use comb::CombFilter;
pub use envelope::{Envelope, EnvelopeStage};
pub use follower::EnvelopeFollower;
pub use instruments::{Instrument, InstrumentDefinition, PlayingRange, TimbreModel};
pub use oscillator::{Oscillator, Waveform};
pub use pan::Panner;
pub use parameter::{Parameter, ParameterError, ParameterSpec, ParameterStore};
pub use pitch::Tuning;
pub use subtractive::SubtractiveVoice;
pub use voice::{InstrumentVoice, Voice, VoiceShared, VoiceState};
