//! Pitch and decay model
//!
//! Equal-tempered note/frequency conversion and the linear decay-time model
//! for struck bars. Measured decay times for a resonated marimba bar are
//! 1.5 s at E3 (MIDI 52) and 0.4 s at E6 (MIDI 88); the line through those
//! points is
//!
//! ```text
//! decay(note) = base - 11 * (note - 52) / 360
//! ```
//!
//! floored at [`MIN_DECAY`] so no envelope segment collapses to zero length.

use serde::{Deserialize, Serialize};

pub const C2: u8 = 36;
pub const C4: u8 = 60;
pub const C6: u8 = 84;
pub const C7: u8 = 96;
pub const C8: u8 = 108;

/// Note whose decay equals the base decay
pub const DECAY_ANCHOR_NOTE: u8 = 52;
/// Decay of the anchor note for a marimba with resonators
pub const BASE_DECAY: f64 = 1.5;
/// Shortest decay the model will return, in seconds
pub const MIN_DECAY: f64 = 0.15;

/// Concert pitch reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Frequency of A4 (MIDI 69) in Hz
    pub a4: f64,
}

impl Tuning {
    pub const fn new(a4: f64) -> Self {
        Self { a4 }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self { a4: 440.0 }
    }
}

/// Frequency of a MIDI note. Notes outside 0..=127 are not rejected.
pub fn midi_note_to_freq(note: u8, tuning: Tuning) -> f64 {
    2.0_f64.powf((note as f64 - 69.0) / 12.0) * tuning.a4
}

/// Nearest MIDI note for a frequency, clamped to 0..=127.
///
/// Rounds rather than truncates so frequencies a hair under a note do not
/// land a semitone flat.
pub fn freq_to_midi_note(freq: f64, tuning: Tuning) -> u8 {
    if !freq.is_finite() || freq <= 0.0 {
        return 0;
    }
    let note = 12.0 * (freq / tuning.a4).log2() + 69.0;
    note.round().clamp(0.0, 127.0) as u8
}

/// Natural decay time for a note, in seconds
pub fn marimba_decay(note: u8, base_decay: f64) -> f64 {
    let decay = base_decay - 11.0 * (note as f64 - DECAY_ANCHOR_NOTE as f64) / 360.0;
    decay.max(MIN_DECAY)
}

/// Map [0, 1] onto [0.2, 1]
pub fn reduce_range(f: f64) -> f64 {
    f * 4.0 / 5.0 + 0.2
}
