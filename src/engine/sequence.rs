//! Scripted note sequences
//!
//! A sequence can be rendered offline into level reports or played live
//! through an [`EngineHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Engine, EngineHandle, NoteEvent};

/// One scripted note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceNote {
    /// Start in seconds
    pub time: f64,

    /// MIDI note number
    pub note: u8,

    /// Seconds until note-off (None = never released)
    pub duration: Option<f64>,

    /// Note-on velocity 1-127 (default: 100)
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_velocity() -> u8 { 100 }

/// A note event at a time in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub time: f64,
    pub event: NoteEvent,
}

/// Note events ordered by time
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    events: Vec<TimedEvent>,
}

impl Sequence {
    /// Expand notes into ordered on/off events. At equal times note-offs
    /// come first so a repeated note retriggers.
    pub fn new(notes: &[SequenceNote]) -> Self {
        let mut events = Vec::with_capacity(notes.len() * 2);
        for note in notes {
            events.push(TimedEvent {
                time: note.time,
                event: NoteEvent::On {
                    note: note.note,
                    velocity: note.velocity,
                },
            });
            if let Some(duration) = note.duration {
                events.push(TimedEvent {
                    time: note.time + duration,
                    event: NoteEvent::Off { note: note.note },
                });
            }
        }

        events.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then_with(|| is_note_on(&a.event).cmp(&is_note_on(&b.event)))
        });
        Self { events }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time of the last event
    pub fn end_time(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time)
    }
}

fn is_note_on(event: &NoteEvent) -> bool {
    matches!(event, NoteEvent::On { .. })
}

/// Levels over one second of rendered output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReport {
    pub second: usize,
    pub peak: f32,
    pub rms: f32,
    /// Most voices live during the second
    pub voices: usize,
}

impl LevelReport {
    /// Peak in dB relative to full scale
    pub fn peak_db(&self) -> f32 {
        20.0 * self.peak.log10()
    }
}

/// Render `duration` seconds of `sequence` and report levels per second
pub fn render_sequence(engine: &mut Engine, sequence: &Sequence, duration: f64) -> Vec<LevelReport> {
    let mut meter = LevelMeter::new(engine.sample_rate().round() as u64);
    render_sequence_with(engine, sequence, duration, |block, voices| {
        meter.push(block, voices)
    });
    meter.finish()
}

/// Render `duration` seconds of `sequence`, handing each stereo block and
/// the live voice count after it to `sink`. Events land on their exact
/// frame.
pub fn render_sequence_with<F>(engine: &mut Engine, sequence: &Sequence, duration: f64, mut sink: F)
where
    F: FnMut(&[f32], usize),
{
    let sample_rate = engine.sample_rate();
    let total = (duration.max(0.0) * sample_rate).ceil() as u64;
    let block = engine.block_size() as u64;
    let mut buffer = vec![0.0f32; engine.block_size() * 2];

    let frame_of = |time: f64| (time.max(0.0) * sample_rate).round() as u64;
    let mut events = sequence.events().iter().peekable();
    let mut frame = 0;

    while frame < total {
        while let Some(timed) = events.next_if(|e| frame_of(e.time) <= frame) {
            debug!("frame {frame}: {:?}", timed.event);
            engine.apply(timed.event);
        }

        let next_event = events.peek().map_or(u64::MAX, |e| frame_of(e.time));
        let len = block.min(total - frame).min(next_event - frame);
        let out = &mut buffer[..len as usize * 2];
        engine.render(out);
        sink(out, engine.active_voices());
        frame += len;
    }
}

/// Per-second peak and RMS accumulator
struct LevelMeter {
    window: u64,
    filled: u64,
    peak: f32,
    sum: f64,
    voices: usize,
    latest_voices: usize,
    reports: Vec<LevelReport>,
}

impl LevelMeter {
    fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
            filled: 0,
            peak: 0.0,
            sum: 0.0,
            voices: 0,
            latest_voices: 0,
            reports: Vec::new(),
        }
    }

    fn push(&mut self, samples: &[f32], voices: usize) {
        self.latest_voices = voices;
        self.voices = self.voices.max(voices);
        for frame in samples.chunks_exact(2) {
            for &sample in frame {
                self.peak = self.peak.max(sample.abs());
                self.sum += (sample as f64) * (sample as f64);
            }
            self.filled += 1;
            if self.filled == self.window {
                self.flush();
            }
        }
    }

    fn flush(&mut self) {
        if self.filled == 0 {
            return;
        }
        self.reports.push(LevelReport {
            second: self.reports.len(),
            peak: self.peak,
            rms: (self.sum / (self.filled * 2) as f64).sqrt() as f32,
            voices: self.voices,
        });
        self.filled = 0;
        self.peak = 0.0;
        self.sum = 0.0;
        self.voices = self.latest_voices;
    }

    fn finish(mut self) -> Vec<LevelReport> {
        self.flush();
        self.reports
    }
}

/// Feed `sequence` to a running engine in real time. Returns early when
/// `running` is cleared.
pub fn play_sequence(handle: &mut EngineHandle, sequence: &Sequence, running: &AtomicBool) {
    info!("playing {} sequence events", sequence.events().len());
    let start = Instant::now();

    for timed in sequence.events() {
        let due = start + Duration::from_secs_f64(timed.time.max(0.0));
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= due {
                break;
            }
            thread::sleep((due - now).min(Duration::from_millis(10)));
        }

        match timed.event {
            NoteEvent::On { note, velocity } => handle.note_on(note, velocity),
            NoteEvent::Off { note } => handle.note_off(note),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSettings, VoiceStealing};
    use crate::synth::instruments::Instrument;

    fn engine(instrument: Instrument) -> Engine {
        let settings = EngineSettings {
            block_size: 256,
            polyphony: 8,
            stealing: VoiceStealing::Oldest,
            volume: 1.0,
            ..Default::default()
        };
        Engine::new(instrument, settings).unwrap().0
    }

    fn note(time: f64, note: u8, duration: Option<f64>) -> SequenceNote {
        SequenceNote {
            time,
            note,
            duration,
            velocity: 100,
        }
    }

    #[test]
    fn test_events_sorted_with_offs_first() {
        let sequence = Sequence::new(&[
            note(1.0, 64, None),
            note(0.5, 60, Some(0.5)),
            note(1.0, 60, None),
        ]);
        let events: Vec<_> = sequence.events().iter().map(|e| (e.time, e.event)).collect();
        assert_eq!(events[0].0, 0.5);
        assert_eq!(events[1], (1.0, NoteEvent::Off { note: 60 }));
        assert!(matches!(events[2].1, NoteEvent::On { .. }));
        assert!(matches!(events[3].1, NoteEvent::On { .. }));
        assert_eq!(sequence.end_time(), 1.0);
    }

    #[test]
    fn test_peak_db() {
        let report = LevelReport { second: 0, peak: 0.5, rms: 0.1, voices: 1 };
        assert!((report.peak_db() + 6.0206).abs() < 1e-3);
        let silent = LevelReport { peak: 0.0, ..report };
        assert_eq!(silent.peak_db(), f32::NEG_INFINITY);
    }

    #[test]
    fn test_empty_sequence_is_silent() {
        let mut engine = engine(Instrument::Marimba);
        let reports = render_sequence(&mut engine, &Sequence::default(), 2.5);
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.peak == 0.0 && r.voices == 0));
    }

    #[test]
    fn test_note_starts_on_its_frame() {
        let mut engine = engine(Instrument::Xylophone);
        let sequence = Sequence::new(&[note(0.25, 72, None)]);

        let mut samples = Vec::new();
        render_sequence_with(&mut engine, &sequence, 0.5, |block, _| {
            samples.extend_from_slice(block)
        });

        assert_eq!(samples.len(), 48000);
        let onset = 12000 * 2;
        assert!(samples[..onset].iter().all(|&s| s == 0.0));
        assert!(samples[onset..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_struck_note_decays_and_frees() {
        let mut engine = engine(Instrument::Marimba);
        let sequence = Sequence::new(&[note(0.0, 60, Some(0.1))]);
        let reports = render_sequence(&mut engine, &sequence, 8.0);

        assert_eq!(reports.len(), 8);
        assert!(reports[0].peak > 0.0);
        assert!(reports[0].rms > reports[1].rms);
        assert_eq!(reports[0].voices, 1);
        assert_eq!(reports[7].voices, 0);
        assert_eq!(reports[7].peak, 0.0);
    }

    #[test]
    fn test_held_subtractive_note_sustains() {
        let mut engine = engine(Instrument::Subtractive);
        let sequence = Sequence::new(&[note(0.0, 57, None)]);
        let reports = render_sequence(&mut engine, &sequence, 3.0);

        assert!(reports.iter().all(|r| r.voices == 1));
        assert!(reports[2].rms > 0.0);
    }

    #[test]
    fn test_play_sequence_stops_when_cleared() {
        let (_engine, mut handle) =
            Engine::new(Instrument::Marimba, EngineSettings::default()).unwrap();
        let sequence = Sequence::new(&[note(60.0, 60, None)]);
        let running = AtomicBool::new(false);

        play_sequence(&mut handle, &sequence, &running);
        assert_eq!(handle.stats().dropped_notes(), 0);
    }
}
