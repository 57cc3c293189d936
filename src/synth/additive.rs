//! Additive struck-bar voice
//!
//! Three sine partials: the fundamental and two overtones at the
//! instrument's harmonic ratios. Each partial has its own envelope scaled by
//! its ratio, so the overtones attack and die away faster than the
//! fundamental. Hardness sets how loud the overtones are, brightness moves
//! weight from the first overtone to the second.
//!
//! The voice free-runs like a struck bar. Note-off does nothing; the voice
//! frees itself once the fundamental has died away.

use std::sync::Arc;

use super::envelope::Envelope;
use super::follower::EnvelopeFollower;
use super::instruments::{AdditiveConstants, InstrumentDefinition};
use super::oscillator::{Oscillator, Waveform};
use super::pan::Panner;
use super::parameter::{BlockSnapshot, Parameter, ParameterError};
use super::pitch::{marimba_decay, midi_note_to_freq, Tuning, C6, C8, MIN_DECAY};
use super::voice::{Voice, VoiceShared, VoiceState, MAX_PARTIALS, SILENCE_THRESHOLD};

const PARTIALS: usize = MAX_PARTIALS;

/// Fade applied to the second overtone: full below C6, gone at C8
pub fn location(note: u8) -> f64 {
    let position = (note as f64 - C6 as f64) / (C8 as f64 - C6 as f64);
    (1.0 - position).clamp(0.0, 1.0)
}

/// Harmonic ratios of the three partials
pub fn harmonics(snapshot: &BlockSnapshot) -> [f64; PARTIALS] {
    [
        1.0,
        snapshot.get(Parameter::FirstOvertone),
        snapshot.get(Parameter::SecondOvertone),
    ]
}

/// Attack, decay and release lengths of each partial's envelope
pub fn segment_lengths(
    note: u8,
    snapshot: &BlockSnapshot,
    harmonics: [f64; PARTIALS],
) -> [[f64; 3]; PARTIALS] {
    let attack = snapshot.get(Parameter::AttackTime);
    let decay = snapshot.get(Parameter::DecayTime);
    let release = marimba_decay(note, snapshot.get(Parameter::ReleaseTime)).max(MIN_DECAY);

    harmonics.map(|h| {
        let h = h.max(1.0);
        [attack / h, decay / h, release / h]
    })
}

/// Gain of each partial before the output scaling
pub fn partial_weights(
    note: u8,
    snapshot: &BlockSnapshot,
    constants: &AdditiveConstants,
) -> [f64; PARTIALS] {
    let brightness = snapshot.get(Parameter::Brightness);
    let scaled_hardness = snapshot.get(Parameter::Hardness) / constants.scale_hardness;
    [
        1.0,
        scaled_hardness * (1.0 - brightness),
        scaled_hardness * brightness * location(note),
    ]
}

/// Three-partial additive voice
pub struct AdditiveVoice {
    constants: AdditiveConstants,
    tuning: Tuning,

    oscillators: [Oscillator; PARTIALS],
    envelopes: [Envelope; PARTIALS],
    followers: [EnvelopeFollower; PARTIALS],
    panner: Panner,

    shared: Arc<VoiceShared>,
}

impl AdditiveVoice {
    pub fn new(
        definition: &'static InstrumentDefinition,
        constants: AdditiveConstants,
        sample_rate: f64,
        tuning: Tuning,
    ) -> Result<Self, ParameterError> {
        Ok(Self {
            constants,
            tuning,
            oscillators: std::array::from_fn(|_| {
                Oscillator::new(Waveform::Sine, 440.0, sample_rate)
            }),
            envelopes: std::array::from_fn(|_| {
                Envelope::new(sample_rate, constants.levels, constants.curve)
            }),
            followers: std::array::from_fn(|_| EnvelopeFollower::new(sample_rate)),
            panner: Panner::new(),
            shared: Arc::new(VoiceShared::new(definition, tuning)?),
        })
    }

    /// Retune oscillators and envelopes from this block's parameters
    fn prepare_block(&mut self, note: u8, snapshot: &BlockSnapshot) {
        let fundamental = midi_note_to_freq(note, self.tuning);
        let harmonics = harmonics(snapshot);
        let lengths = segment_lengths(note, snapshot, harmonics);

        for i in 0..PARTIALS {
            self.oscillators[i].set_frequency(fundamental * harmonics[i]);
            self.envelopes[i].set_lengths(lengths[i]);
        }
        self.panner.set_position(snapshot.get(Parameter::Pan));
    }
}

impl Voice for AdditiveVoice {
    fn trigger_on(&mut self, note: u8) {
        if !self.shared.state().is_live() {
            for osc in &mut self.oscillators {
                osc.reset();
            }
            for follower in &mut self.followers {
                follower.reset();
            }
            self.shared.publish_followers(&[0.0; PARTIALS]);
        }
        for env in &mut self.envelopes {
            env.reset();
        }
        self.shared.set_note(note);
        self.shared.set_state(VoiceState::Triggered);
    }

    fn trigger_off(&mut self) {}

    fn render_audio(&mut self, out: &mut [f32]) {
        match self.shared.state() {
            VoiceState::Idle | VoiceState::Free => return,
            VoiceState::Triggered => self.shared.set_state(VoiceState::Sounding),
            VoiceState::Sounding | VoiceState::Releasing => {}
        }

        let note = self.shared.note();
        let snapshot = self.shared.params().snapshot();
        self.prepare_block(note, &snapshot);

        let weights = partial_weights(note, &snapshot, &self.constants);
        let gain = snapshot.get(Parameter::Amplitude) / self.constants.scale_amplitude;

        for frame in out.chunks_exact_mut(2) {
            let mut sum = 0.0;
            for i in 0..PARTIALS {
                let sample =
                    self.oscillators[i].generate() * self.envelopes[i].process() * weights[i];
                self.followers[i].process(sample);
                sum += sample;
            }

            let (left, right) = self.panner.process(sum * gain);
            frame[0] += left as f32;
            frame[1] += right as f32;
        }

        let levels = self.followers.each_ref().map(EnvelopeFollower::value);
        self.shared.publish_followers(&levels);

        if self.followers[0].is_silent(SILENCE_THRESHOLD) && self.envelopes[0].is_done() {
            self.shared.set_state(VoiceState::Free);
        }
    }

    fn shared(&self) -> &Arc<VoiceShared> {
        &self.shared
    }
}
