//! Audio engine for Mallet
//!
//! A fixed pool of voices owned by the audio thread. Note events arrive
//! from the control thread through a lock-free ring buffer; controller
//! values arrive through a shared atomic parameter store that seeds each
//! voice when it is triggered.

pub mod midi;
pub mod player;
pub mod sequence;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};

use crate::mapping::ControllerMap;
use crate::synth::instruments::{Instrument, InstrumentDefinition};
use crate::synth::parameter::{Parameter, ParameterError, ParameterStore};
use crate::synth::pitch::Tuning;
use crate::synth::voice::{InstrumentVoice, Voice, VoiceShared, VoiceState};
use crate::viz::visualizer::NoteVisual;
use midi::MidiMessage;

/// Capacity of the note event queue
const EVENT_QUEUE_SIZE: usize = 1024;

/// A note event for the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

/// What to do with a note-on when every voice is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStealing {
    /// Reuse the voice that was triggered longest ago
    #[default]
    Oldest,
    /// Ignore the note
    Drop,
}

/// Counters readable from any thread
#[derive(Debug, Default)]
pub struct EngineStats {
    dropped_notes: AtomicU64,
    stolen_voices: AtomicU64,
    active_voices: AtomicUsize,
}

impl EngineStats {
    /// Notes ignored because the pool or event queue was full
    pub fn dropped_notes(&self) -> u64 {
        self.dropped_notes.load(Ordering::Relaxed)
    }

    pub fn stolen_voices(&self) -> u64 {
        self.stolen_voices.load(Ordering::Relaxed)
    }

    /// Voices sounding after the last rendered block
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }
}

/// Engine construction settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub sample_rate: f64,
    /// Frames rendered per voice pass
    pub block_size: usize,
    pub polyphony: usize,
    pub stealing: VoiceStealing,
    pub volume: f64,
    pub tuning: Tuning,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 512,
            polyphony: 32,
            stealing: VoiceStealing::Oldest,
            volume: 0.8,
            tuning: Tuning::default(),
        }
    }
}

/// The voice pool. Owned by the audio thread.
pub struct Engine {
    definition: &'static InstrumentDefinition,
    settings: EngineSettings,

    voices: Vec<InstrumentVoice>,
    /// Trigger order of each voice, for stealing
    started: Vec<u64>,
    clock: u64,

    controls: Arc<ParameterStore>,
    events: Consumer<NoteEvent>,
    stats: Arc<EngineStats>,
}

impl Engine {
    /// Create an engine and the handle that controls it
    pub fn new(
        instrument: Instrument,
        settings: EngineSettings,
    ) -> Result<(Self, EngineHandle), ParameterError> {
        let definition = instrument.definition();
        let polyphony = settings.polyphony.max(1);

        let voices = (0..polyphony)
            .map(|index| {
                InstrumentVoice::new(definition, settings.sample_rate, settings.tuning, index)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let controls = Arc::new(definition.store()?);
        let stats = Arc::new(EngineStats::default());
        let (producer, consumer) = RingBuffer::new(EVENT_QUEUE_SIZE);

        let engine = Self {
            definition,
            settings: EngineSettings {
                polyphony,
                block_size: settings.block_size.max(1),
                ..settings
            },
            voices,
            started: vec![0; polyphony],
            clock: 0,
            controls: controls.clone(),
            events: consumer,
            stats: stats.clone(),
        };

        let handle = EngineHandle {
            controllers: ControllerMap::with_defaults(&controls),
            producer,
            controls,
            stats,
        };

        Ok((engine, handle))
    }

    pub fn sample_rate(&self) -> f64 {
        self.settings.sample_rate
    }

    /// Frames rendered per voice pass
    pub fn block_size(&self) -> usize {
        self.settings.block_size
    }

    pub fn definition(&self) -> &'static InstrumentDefinition {
        self.definition
    }

    pub fn controls(&self) -> &Arc<ParameterStore> {
        &self.controls
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.settings.volume = volume.clamp(0.0, 1.0);
    }

    /// Shared views of every pool slot, for the graphics thread
    pub fn voice_views(&self) -> Vec<Arc<VoiceShared>> {
        self.voices.iter().map(|v| v.shared().clone()).collect()
    }

    /// Voices currently live
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.state().is_live()).count()
    }

    /// Pick the voice for `note`: a live voice already playing it, else an
    /// idle voice, else one chosen by the stealing policy.
    pub fn allocate(&mut self, note: u8) -> Option<usize> {
        if let Some(index) = self
            .voices
            .iter()
            .position(|v| v.state().is_live() && v.note() == note)
        {
            return Some(index);
        }

        for voice in &mut self.voices {
            voice.reclaim();
        }
        if let Some(index) = self
            .voices
            .iter()
            .position(|v| v.state() == VoiceState::Idle)
        {
            return Some(index);
        }

        match self.settings.stealing {
            VoiceStealing::Oldest => {
                let index = (0..self.voices.len()).min_by_key(|&i| self.started[i])?;
                self.stats.stolen_voices.fetch_add(1, Ordering::Relaxed);
                Some(index)
            }
            VoiceStealing::Drop => {
                self.stats.dropped_notes.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Start `note`. The voice's parameters are seeded from the shared
    /// controls and its amplitude from the velocity. Velocity zero is a
    /// note-off.
    pub fn trigger_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.trigger_off(note);
            return;
        }
        let Some(index) = self.allocate(note) else {
            return;
        };

        let voice = &mut self.voices[index];
        voice.params().copy_from(&self.controls);
        if voice.params().contains(Parameter::Amplitude) {
            voice
                .params()
                .set(Parameter::Amplitude, velocity.min(127) as f64 / 127.0);
        }
        voice.trigger_on(note);

        self.clock += 1;
        self.started[index] = self.clock;
    }

    /// Release every live voice playing `note`
    pub fn trigger_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.state().is_live() && voice.note() == note {
                voice.trigger_off();
            }
        }
    }

    /// Apply one note event immediately
    pub fn apply(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::On { note, velocity } => self.trigger_on(note, velocity),
            NoteEvent::Off { note } => self.trigger_off(note),
        }
    }

    /// Apply every queued note event
    pub fn process_events(&mut self) {
        while let Ok(event) = self.events.pop() {
            self.apply(event);
        }
    }

    /// Render interleaved stereo into `out`, overwriting it
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        self.process_events();

        let block = self.settings.block_size * 2;
        for chunk in out.chunks_mut(block) {
            for voice in &mut self.voices {
                voice.render_audio(chunk);
            }
        }

        let volume = self.settings.volume as f32;
        for sample in out.iter_mut() {
            *sample *= volume;
        }

        for voice in &mut self.voices {
            voice.reclaim();
        }
        self.stats
            .active_voices
            .store(self.active_voices(), Ordering::Relaxed);
    }

    /// Push the rectangles of every live voice
    pub fn render_graphics(&self, out: &mut Vec<NoteVisual>) {
        for voice in &self.voices {
            voice.render_graphics(out);
        }
    }
}

/// Push the rectangles of every live voice in `views`
pub fn render_graphics<V: AsRef<VoiceShared>>(views: &[V], out: &mut Vec<NoteVisual>) {
    for view in views {
        view.as_ref().render_graphics(out);
    }
}

/// Control-thread side of an [`Engine`]
pub struct EngineHandle {
    producer: Producer<NoteEvent>,
    controls: Arc<ParameterStore>,
    controllers: ControllerMap,
    stats: Arc<EngineStats>,
}

impl EngineHandle {
    /// Queue a note-on. Returns false if the queue is full.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> bool {
        self.push(NoteEvent::On {
            note: note.min(127),
            velocity,
        })
    }

    /// Queue a note-off. Returns false if the queue is full.
    pub fn note_off(&mut self, note: u8) -> bool {
        self.push(NoteEvent::Off { note: note.min(127) })
    }

    fn push(&mut self, event: NoteEvent) -> bool {
        match self.producer.push(event) {
            Ok(()) => true,
            Err(_) => {
                self.stats.dropped_notes.fetch_add(1, Ordering::Relaxed);
                warn!("note queue full, dropped {event:?}");
                false
            }
        }
    }

    /// Shared controls seeding every new note
    pub fn controls(&self) -> &Arc<ParameterStore> {
        &self.controls
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn controllers(&self) -> &ControllerMap {
        &self.controllers
    }

    pub fn set_controllers(&mut self, controllers: ControllerMap) {
        self.controllers = controllers;
    }

    /// Set a control value if the instrument has the parameter
    pub fn set_parameter(&self, key: Parameter, value: f64) -> bool {
        if self.controls.contains(key) {
            self.controls.set(key, value);
            true
        } else {
            false
        }
    }

    /// Route one MIDI message
    pub fn handle_midi(&mut self, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn(_, note, velocity) => {
                self.note_on(note, velocity);
            }
            MidiMessage::NoteOff(_, note, _) => {
                self.note_off(note);
            }
            MidiMessage::ControlChange(_, controller, value) => {
                self.controllers.apply(controller, value, &self.controls);
            }
            other => debug!("unhandled MIDI message {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::voice::SILENCE_THRESHOLD;

    fn settings(polyphony: usize, stealing: VoiceStealing) -> EngineSettings {
        EngineSettings {
            sample_rate: 48000.0,
            block_size: 256,
            polyphony,
            stealing,
            volume: 1.0,
            tuning: Tuning::default(),
        }
    }

    fn engine(polyphony: usize, stealing: VoiceStealing) -> (Engine, EngineHandle) {
        Engine::new(Instrument::Marimba, settings(polyphony, stealing)).unwrap()
    }

    #[test]
    fn test_engine_creation() {
        let (engine, handle) = engine(4, VoiceStealing::Oldest);
        assert_eq!(engine.sample_rate(), 48000.0);
        assert_eq!(engine.voice_views().len(), 4);
        assert_eq!(engine.active_voices(), 0);
        assert!(Arc::ptr_eq(engine.controls(), handle.controls()));
    }

    #[test]
    fn test_events_reach_audio_thread() {
        let (mut engine, mut handle) = engine(4, VoiceStealing::Oldest);
        assert!(handle.note_on(60, 100));

        let mut buffer = vec![0.0f32; 1024];
        engine.render(&mut buffer);

        assert_eq!(engine.active_voices(), 1);
        assert_eq!(handle.stats().active_voices(), 1);
        assert!(buffer.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn test_same_note_retriggers_same_voice() {
        let (mut engine, _handle) = engine(4, VoiceStealing::Oldest);
        engine.trigger_on(60, 100);
        let first = engine.allocate(60);
        engine.trigger_on(60, 100);
        assert_eq!(engine.active_voices(), 1);
        assert_eq!(engine.allocate(60), first);
    }

    #[test]
    fn test_steal_oldest_when_full() {
        let (mut engine, _handle) = engine(2, VoiceStealing::Oldest);
        engine.trigger_on(60, 100);
        engine.trigger_on(62, 100);
        engine.trigger_on(64, 100);

        let notes: Vec<u8> = engine.voice_views().iter().map(|v| v.note()).collect();
        assert!(notes.contains(&62) && notes.contains(&64));
        assert_eq!(engine.stats().stolen_voices(), 1);
        assert_eq!(engine.stats().dropped_notes(), 0);
    }

    #[test]
    fn test_drop_when_full() {
        let (mut engine, _handle) = engine(2, VoiceStealing::Drop);
        engine.trigger_on(60, 100);
        engine.trigger_on(62, 100);
        engine.trigger_on(64, 100);

        let notes: Vec<u8> = engine.voice_views().iter().map(|v| v.note()).collect();
        assert!(notes.contains(&60) && notes.contains(&62));
        assert_eq!(engine.stats().dropped_notes(), 1);
    }

    #[test]
    fn test_velocity_seeds_amplitude_over_controls() {
        let (mut engine, handle) = engine(2, VoiceStealing::Oldest);
        handle.set_parameter(Parameter::Hardness, 0.9);
        engine.trigger_on(60, 127);

        let view = engine
            .voice_views()
            .into_iter()
            .find(|v| v.state().is_live())
            .unwrap();
        assert_eq!(view.params().get(Parameter::Hardness), 0.9);
        assert_eq!(view.params().get(Parameter::Amplitude), 1.0);
        // The controls store keeps its own amplitude
        assert_eq!(handle.controls().get(Parameter::Amplitude), 0.8);
    }

    #[test]
    fn test_zero_velocity_is_note_off() {
        let (mut engine, _handle) = engine(2, VoiceStealing::Oldest);
        engine.trigger_on(60, 0);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_voices_free_and_return_to_pool() {
        let (mut engine, mut handle) = engine(2, VoiceStealing::Oldest);
        handle.note_on(96, 100);
        handle.note_off(96);

        let mut buffer = vec![0.0f32; 512];
        for _ in 0..2000 {
            engine.render(&mut buffer);
            if engine.active_voices() == 0 {
                break;
            }
        }
        assert_eq!(engine.active_voices(), 0);
        for view in engine.voice_views() {
            assert_eq!(view.state(), VoiceState::Idle);
            assert!(view.follower(0) < SILENCE_THRESHOLD);
        }
        engine.render(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_midi_controller_updates_controls() {
        let (_engine, mut handle) = engine(2, VoiceStealing::Oldest);
        handle.handle_midi(MidiMessage::ControlChange(0, 7, 0));
        assert_eq!(handle.controls().get(Parameter::Hardness), 0.0);
    }

    #[test]
    fn test_graphics_follow_live_voices() {
        let (mut engine, mut handle) = engine(4, VoiceStealing::Oldest);
        let views = engine.voice_views();

        let mut visuals = Vec::new();
        render_graphics(&views, &mut visuals);
        assert!(visuals.is_empty());

        handle.note_on(60, 100);
        handle.note_on(67, 100);
        let mut buffer = vec![0.0f32; 1024];
        engine.render(&mut buffer);

        render_graphics(&views, &mut visuals);
        assert_eq!(visuals.len(), 6);

        let mut direct = Vec::new();
        engine.render_graphics(&mut direct);
        assert_eq!(direct, visuals);
    }

    #[test]
    fn test_default_subtractive_chord_stays_below_full_scale() {
        let settings = EngineSettings {
            volume: 0.8,
            ..settings(4, VoiceStealing::Oldest)
        };
        let (mut engine, _handle) = Engine::new(Instrument::Subtractive, settings).unwrap();
        for note in [60, 64, 67] {
            engine.trigger_on(note, 127);
        }

        let mut buffer = vec![0.0f32; 512];
        for _ in 0..200 {
            engine.render(&mut buffer);
            for &s in &buffer {
                assert!(s.abs() < 1.0, "sample {s}");
            }
        }
        assert_eq!(engine.active_voices(), 3);
    }

    #[test]
    fn test_volume_scales_output() {
        let (mut loud, _h1) = engine(1, VoiceStealing::Oldest);
        let (mut quiet, _h2) = engine(1, VoiceStealing::Oldest);
        quiet.set_volume(0.5);
        loud.trigger_on(60, 100);
        quiet.trigger_on(60, 100);

        let mut a = vec![0.0f32; 512];
        let mut b = vec![0.0f32; 512];
        loud.render(&mut a);
        quiet.render(&mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x * 0.5 - y).abs() < 1e-6);
        }
    }
}
