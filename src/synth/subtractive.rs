//! Subtractive voice
//!
//! A bright harmonic source with a little noise, shaped by a sustaining
//! envelope and coloured by a comb filter tuned to the played note.

use std::sync::Arc;

use super::comb::CombFilter;
use super::envelope::Envelope;
use super::follower::EnvelopeFollower;
use super::instruments::{InstrumentDefinition, SubtractiveConstants};
use super::oscillator::{Oscillator, Waveform};
use super::pan::Panner;
use super::parameter::{BlockSnapshot, Parameter, ParameterError};
use super::pitch::{marimba_decay, midi_note_to_freq, Tuning};
use super::voice::{Voice, VoiceShared, VoiceState, SILENCE_THRESHOLD};

/// Filtered-harmonics voice
pub struct SubtractiveVoice {
    constants: SubtractiveConstants,
    tuning: Tuning,

    oscillator: Oscillator,
    noise: Oscillator,
    envelope: Envelope,
    comb: CombFilter,
    follower: EnvelopeFollower,
    panner: Panner,

    shared: Arc<VoiceShared>,
}

impl SubtractiveVoice {
    pub fn new(
        definition: &'static InstrumentDefinition,
        constants: SubtractiveConstants,
        sample_rate: f64,
        tuning: Tuning,
        noise_seed: u64,
    ) -> Result<Self, ParameterError> {
        Ok(Self {
            constants,
            tuning,
            oscillator: Oscillator::new(
                Waveform::Harmonics(constants.harmonics),
                440.0,
                sample_rate,
            ),
            noise: Oscillator::new(Waveform::WhiteNoise, 0.0, sample_rate).with_seed(noise_seed),
            envelope: Envelope::new(sample_rate, constants.levels, constants.curve)
                .with_sustain_point(constants.sustain_point),
            comb: CombFilter::new(sample_rate),
            follower: EnvelopeFollower::new(sample_rate),
            panner: Panner::new(),
            shared: Arc::new(VoiceShared::new(definition, tuning)?),
        })
    }

    fn prepare_block(&mut self, note: u8, snapshot: &BlockSnapshot) {
        let freq = midi_note_to_freq(note, self.tuning);
        self.oscillator.set_frequency(freq);

        self.envelope.set_lengths([
            snapshot.get(Parameter::AttackTime),
            snapshot.get(Parameter::DecayTime),
            marimba_decay(note, snapshot.get(Parameter::ReleaseTime)),
        ]);

        // Delay is counted in periods of the note
        self.comb.set_delay(snapshot.get(Parameter::Delay) / freq);
        self.comb.set_feedforward(snapshot.get(Parameter::Feedforward));
        self.comb.set_feedback(snapshot.get(Parameter::Feedback));

        self.panner.set_position(snapshot.get(Parameter::Pan));
    }
}

impl Voice for SubtractiveVoice {
    fn trigger_on(&mut self, note: u8) {
        if !self.shared.state().is_live() {
            self.oscillator.reset();
            self.comb.reset();
            self.follower.reset();
            self.shared.publish_followers(&[0.0]);
        }
        self.envelope.reset();
        self.shared.set_note(note);
        self.shared.set_state(VoiceState::Triggered);
    }

    fn trigger_off(&mut self) {
        if self.shared.state().is_live() {
            self.envelope.release();
            self.shared.set_state(VoiceState::Releasing);
        }
    }

    fn render_audio(&mut self, out: &mut [f32]) {
        match self.shared.state() {
            VoiceState::Idle | VoiceState::Free => return,
            VoiceState::Triggered => self.shared.set_state(VoiceState::Sounding),
            VoiceState::Sounding | VoiceState::Releasing => {}
        }

        let note = self.shared.note();
        let snapshot = self.shared.params().snapshot();
        self.prepare_block(note, &snapshot);

        // Keep the comb's resonance from pushing the voice past full scale
        let amplitude = snapshot.get(Parameter::Amplitude) / self.comb.peak_gain();
        let mix = self.constants.noise_mix;

        for frame in out.chunks_exact_mut(2) {
            let source = self.oscillator.generate() * (1.0 - mix) + self.noise.generate() * mix;
            let sample = self.comb.process(source * self.envelope.process()) * amplitude;
            self.follower.process(sample);

            let (left, right) = self.panner.process(sample);
            frame[0] += left as f32;
            frame[1] += right as f32;
        }

        self.shared.publish_followers(&[self.follower.value()]);

        if self.follower.is_silent(SILENCE_THRESHOLD) && self.envelope.is_done() {
            self.shared.set_state(VoiceState::Free);
        }
    }

    fn shared(&self) -> &Arc<VoiceShared> {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::envelope::EnvelopeStage;
    use crate::synth::instruments::{TimbreModel, SUBTRACTIVE};

    const SAMPLE_RATE: f64 = 48000.0;
    const BLOCK: usize = 256;

    fn voice() -> SubtractiveVoice {
        let TimbreModel::Subtractive(constants) = SUBTRACTIVE.model else {
            unreachable!()
        };
        SubtractiveVoice::new(&SUBTRACTIVE, constants, SAMPLE_RATE, Tuning::default(), 1).unwrap()
    }

    fn render_block(voice: &mut SubtractiveVoice) -> Vec<f32> {
        let mut out = vec![0.0; BLOCK * 2];
        voice.render_audio(&mut out);
        out
    }

    #[test]
    fn test_sustains_until_note_off() {
        let mut voice = voice();
        voice.trigger_on(60);
        for _ in 0..200 {
            render_block(&mut voice);
        }
        assert_eq!(voice.state(), VoiceState::Sounding);
        assert_eq!(voice.envelope.stage(), EnvelopeStage::Sustain);
        assert!(voice.shared().follower(0) > SILENCE_THRESHOLD);
    }

    #[test]
    fn test_lifecycle_with_release() {
        let mut voice = voice();
        voice.trigger_off();
        assert_eq!(voice.state(), VoiceState::Idle);

        voice.trigger_on(57);
        for _ in 0..20 {
            render_block(&mut voice);
        }
        voice.trigger_off();
        assert_eq!(voice.state(), VoiceState::Releasing);

        let mut blocks = 0;
        while voice.state() != VoiceState::Free {
            render_block(&mut voice);
            blocks += 1;
            assert!(blocks < 2000, "voice never freed");
        }
        assert!(voice.shared().follower(0) < SILENCE_THRESHOLD);
        assert!(render_block(&mut voice).iter().all(|&s| s == 0.0));

        voice.reclaim();
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_comb_tracks_note() {
        let mut voice = voice();
        voice.params().set(Parameter::Delay, 2.0);
        voice.trigger_on(69);
        render_block(&mut voice);
        let expected = 2.0 / 440.0 * SAMPLE_RATE;
        assert!((voice.comb.delay_samples() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_output_bounded_at_parameter_corners() {
        for (ff, fb, delay, note) in [
            (1.0, 0.95, 0.25, 36),
            (-1.0, -0.95, 4.0, 108),
            (1.0, 0.95, 4.0, 127),
            (0.0, 0.0, 1.0, 0),
        ] {
            let mut voice = voice();
            let params = voice.params();
            params.set(Parameter::Feedforward, ff);
            params.set(Parameter::Feedback, fb);
            params.set(Parameter::Delay, delay);
            params.set(Parameter::Amplitude, 1.0);
            params.set(Parameter::Pan, 1.0);
            voice.trigger_on(note);
            for block in 0..200 {
                if block == 100 {
                    voice.trigger_off();
                }
                for s in render_block(&mut voice) {
                    assert!(s.is_finite() && s.abs() <= 1.0, "sample {s}");
                }
            }
        }
    }

    #[test]
    fn test_default_parameters_stay_below_full_scale() {
        for note in [36, 48, 57, 60, 72, 84] {
            let mut voice = voice();
            voice.params().set(Parameter::Amplitude, 1.0);
            voice.trigger_on(note);
            for _ in 0..200 {
                for s in render_block(&mut voice) {
                    assert!(s.abs() < 1.0, "note {note}: sample {s}");
                }
            }
        }
    }

    #[test]
    fn test_noise_differs_between_seeds() {
        let TimbreModel::Subtractive(constants) = SUBTRACTIVE.model else {
            unreachable!()
        };
        let mut a = SubtractiveVoice::new(&SUBTRACTIVE, constants, SAMPLE_RATE, Tuning::default(), 1)
            .unwrap();
        let mut b = SubtractiveVoice::new(&SUBTRACTIVE, constants, SAMPLE_RATE, Tuning::default(), 2)
            .unwrap();
        let a: Vec<f64> = (0..1000).map(|_| a.noise.generate()).collect();
        let b: Vec<f64> = (0..1000).map(|_| b.noise.generate()).collect();
        assert_ne!(a, b);
    }
}
