//! Voice trait and shared voice state
//!
//! A voice is owned by the audio thread. What the graphics thread needs to
//! see lives in [`VoiceShared`], behind an `Arc`, as atomics.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::additive::AdditiveVoice;
use super::instruments::{InstrumentDefinition, TimbreModel};
use super::parameter::{AtomicF64, Parameter, ParameterError, ParameterStore};
use super::pitch::{freq_to_midi_note, midi_note_to_freq, Tuning};
use super::subtractive::SubtractiveVoice;
use crate::viz::visualizer::{NoteVisual, Visualizer};

/// Follower level below which a voice counts as silent
pub const SILENCE_THRESHOLD: f64 = 0.001;

/// Most partials a voice meters
pub const MAX_PARTIALS: usize = 3;

/// Lifecycle of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceState {
    /// Available for allocation
    Idle,
    /// Note-on received, nothing rendered yet
    Triggered,
    Sounding,
    /// Note-off received, tail still sounding
    Releasing,
    /// Silent; waiting for the pool to reclaim it
    Free,
}

impl VoiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => VoiceState::Triggered,
            2 => VoiceState::Sounding,
            3 => VoiceState::Releasing,
            4 => VoiceState::Free,
            _ => VoiceState::Idle,
        }
    }

    /// Producing or about to produce sound
    pub fn is_live(self) -> bool {
        matches!(
            self,
            VoiceState::Triggered | VoiceState::Sounding | VoiceState::Releasing
        )
    }
}

/// Voice state visible to other threads
#[derive(Debug)]
pub struct VoiceShared {
    note: AtomicU8,
    state: AtomicU8,
    followers: [AtomicF64; MAX_PARTIALS],
    params: ParameterStore,
    visualizer: Visualizer,
    definition: &'static InstrumentDefinition,
    tuning: Tuning,
}

impl VoiceShared {
    pub fn new(
        definition: &'static InstrumentDefinition,
        tuning: Tuning,
    ) -> Result<Self, ParameterError> {
        Ok(Self {
            note: AtomicU8::new(0),
            state: AtomicU8::new(VoiceState::Idle as u8),
            followers: Default::default(),
            params: definition.store()?,
            visualizer: Visualizer::new(definition.range),
            definition,
            tuning,
        })
    }

    pub fn note(&self) -> u8 {
        self.note.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> VoiceState {
        VoiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn definition(&self) -> &'static InstrumentDefinition {
        self.definition
    }

    /// Last published follower level of partial `index`
    pub fn follower(&self, index: usize) -> f64 {
        self.followers.get(index).map_or(0.0, AtomicF64::load)
    }

    pub(crate) fn set_note(&self, note: u8) {
        self.note.store(note, Ordering::Relaxed);
    }

    pub(crate) fn set_state(&self, state: VoiceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn publish_followers(&self, values: &[f64]) {
        for (slot, &value) in self.followers.iter().zip(values) {
            slot.store(value);
        }
    }

    /// Push the rectangles for this voice. Voices that are not live draw
    /// nothing.
    pub fn render_graphics(&self, out: &mut Vec<NoteVisual>) {
        if !self.state().is_live() {
            return;
        }

        let note = self.note();
        let window = (
            self.params.get(Parameter::VisualWidth),
            self.params.get(Parameter::VisualHeight),
        );

        match self.definition.model {
            TimbreModel::Additive(_) => {
                let hardness = self.params.get(Parameter::Hardness);
                let harmonics = [
                    1.0,
                    self.params.get(Parameter::FirstOvertone),
                    self.params.get(Parameter::SecondOvertone),
                ];
                let fundamental = midi_note_to_freq(note, self.tuning);
                for (i, harmonic) in harmonics.into_iter().enumerate() {
                    let partial = freq_to_midi_note(fundamental * harmonic, self.tuning);
                    out.push(self.visualizer.note_visual(
                        partial,
                        hardness,
                        self.follower(i),
                        window,
                        i != 0,
                    ));
                }
            }
            TimbreModel::Subtractive(_) => {
                out.push(
                    self.visualizer
                        .note_visual(note, 1.0, self.follower(0), window, false),
                );
            }
        }
    }
}

/// Trait for voice implementations
pub trait Voice: Send {
    /// Start a note. Envelopes restart; parameters are left as they are.
    fn trigger_on(&mut self, note: u8);

    /// End a note
    fn trigger_off(&mut self);

    /// Add one block of interleaved stereo into `out`
    fn render_audio(&mut self, out: &mut [f32]);

    /// Current lifecycle state
    fn state(&self) -> VoiceState {
        self.shared().state()
    }

    fn note(&self) -> u8 {
        self.shared().note()
    }

    fn params(&self) -> &ParameterStore {
        self.shared().params()
    }

    fn shared(&self) -> &Arc<VoiceShared>;

    /// Push this voice's rectangles
    fn render_graphics(&self, out: &mut Vec<NoteVisual>) {
        self.shared().render_graphics(out);
    }

    /// Return a free voice to the pool
    fn reclaim(&mut self) {
        if self.state() == VoiceState::Free {
            self.shared().set_state(VoiceState::Idle);
        }
    }
}

/// A voice of either timbre model
pub enum InstrumentVoice {
    Additive(AdditiveVoice),
    Subtractive(SubtractiveVoice),
}

impl InstrumentVoice {
    /// Build the voice for pool slot `index` of `definition`. The slot
    /// seeds the voice's noise so voices in a chord decorrelate.
    pub fn new(
        definition: &'static InstrumentDefinition,
        sample_rate: f64,
        tuning: Tuning,
        index: usize,
    ) -> Result<Self, ParameterError> {
        Ok(match definition.model {
            TimbreModel::Additive(constants) => InstrumentVoice::Additive(AdditiveVoice::new(
                definition,
                constants,
                sample_rate,
                tuning,
            )?),
            TimbreModel::Subtractive(constants) => InstrumentVoice::Subtractive(
                SubtractiveVoice::new(definition, constants, sample_rate, tuning, noise_seed(index))?,
            ),
        })
    }
}

/// Spread pool indices over the xorshift state space
fn noise_seed(index: usize) -> u64 {
    (index as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

impl Voice for InstrumentVoice {
    fn trigger_on(&mut self, note: u8) {
        match self {
            InstrumentVoice::Additive(v) => v.trigger_on(note),
            InstrumentVoice::Subtractive(v) => v.trigger_on(note),
        }
    }

    fn trigger_off(&mut self) {
        match self {
            InstrumentVoice::Additive(v) => v.trigger_off(),
            InstrumentVoice::Subtractive(v) => v.trigger_off(),
        }
    }

    fn render_audio(&mut self, out: &mut [f32]) {
        match self {
            InstrumentVoice::Additive(v) => v.render_audio(out),
            InstrumentVoice::Subtractive(v) => v.render_audio(out),
        }
    }

    fn shared(&self) -> &Arc<VoiceShared> {
        match self {
            InstrumentVoice::Additive(v) => v.shared(),
            InstrumentVoice::Subtractive(v) => v.shared(),
        }
    }

    fn reclaim(&mut self) {
        match self {
            InstrumentVoice::Additive(v) => v.reclaim(),
            InstrumentVoice::Subtractive(v) => v.reclaim(),
        }
    }
}
