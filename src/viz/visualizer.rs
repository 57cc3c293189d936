//! Note visual geometry
//!
//! Turns a note and its measured amplitude into a coloured rectangle in a
//! virtual window whose origin is the bottom-left corner. The window is cut
//! into [`VISUAL_DIVISIONS`] horizontal bands; the fundamental grows up from
//! the top of the lowest band and overtones hang down into it.

use crate::synth::instruments::PlayingRange;
use crate::synth::pitch::reduce_range;

/// Horizontal bands in the window; the lowest holds the overtones
pub const VISUAL_DIVISIONS: f64 = 8.0;

/// Colour in hue/saturation/value with alpha, all components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsva {
    pub h: f64,
    pub s: f64,
    pub v: f64,
    pub a: f64,
}

impl Hsva {
    /// Convert to 8-bit RGB, ignoring alpha
    pub fn to_rgb(self) -> (u8, u8, u8) {
        let h = (self.h.rem_euclid(1.0)) * 6.0;
        let s = self.s.clamp(0.0, 1.0);
        let v = self.v.clamp(0.0, 1.0);

        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match sector as u32 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };

        let to_byte = |c: f64| (c * 255.0).round() as u8;
        (to_byte(r), to_byte(g), to_byte(b))
    }
}

/// One rectangle to draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteVisual {
    pub note: u8,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Hsva,
}

/// Maps notes onto the virtual window of an instrument's playing range
#[derive(Debug, Clone, Copy)]
pub struct Visualizer {
    range: PlayingRange,
}

impl Visualizer {
    pub fn new(range: PlayingRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> PlayingRange {
        self.range
    }

    /// Geometry and colour for `note` sounding at `amplitude`. `reverse`
    /// draws the rectangle downwards from the baseline.
    pub fn note_visual(
        &self,
        note: u8,
        hardness: f64,
        amplitude: f64,
        window: (f64, f64),
        reverse: bool,
    ) -> NoteVisual {
        let (window_width, window_height) = window;

        let offset = note as f64 - self.range.low as f64;
        let division = window_height / VISUAL_DIVISIONS;
        let width = window_width / self.range.span();
        let height = amplitude * 1.8 * division * (VISUAL_DIVISIONS - 1.0);

        let x = width * (offset - 0.5);
        let y = division - if reverse { height } else { 0.0 };

        let color = Hsva {
            h: offset.rem_euclid(12.0) / 12.0,
            s: reduce_range(hardness.clamp(0.0, 1.0)),
            v: 1.0,
            a: (amplitude * 30.0).clamp(0.0, 1.0),
        };

        NoteVisual {
            note,
            x,
            y,
            width,
            height,
            color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::pitch::{C2, C8};

    fn visualizer() -> Visualizer {
        Visualizer::new(PlayingRange::new(C2, C8))
    }

    #[test]
    fn test_geometry() {
        let visual = visualizer().note_visual(C2 + 12, 0.5, 0.1, (1200.0, 600.0), false);
        let width = 1200.0 / 72.0;
        assert!((visual.width - width).abs() < 1e-9);
        assert!((visual.x - width * 11.5).abs() < 1e-9);
        assert!((visual.y - 75.0).abs() < 1e-9);
        assert!((visual.height - 0.1 * 1.8 * 75.0 * 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_hangs_below_baseline() {
        let v = visualizer();
        let up = v.note_visual(60, 0.5, 0.2, (1200.0, 600.0), false);
        let down = v.note_visual(60, 0.5, 0.2, (1200.0, 600.0), true);
        assert_eq!(up.height, down.height);
        assert!((down.y + down.height - up.y).abs() < 1e-9);
    }

    #[test]
    fn test_colour() {
        let v = visualizer();
        let visual = v.note_visual(C2 + 15, 1.0, 0.01, (1200.0, 600.0), false);
        assert!((visual.color.h - 0.25).abs() < 1e-12);
        assert!((visual.color.s - 1.0).abs() < 1e-12);
        assert!((visual.color.a - 0.3).abs() < 1e-12);

        // Octaves share a hue, loud notes are opaque
        let octave = v.note_visual(C2 + 27, 0.0, 0.5, (1200.0, 600.0), false);
        assert!((octave.color.h - visual.color.h).abs() < 1e-12);
        assert!((octave.color.s - 0.2).abs() < 1e-12);
        assert_eq!(octave.color.a, 1.0);
    }

    #[test]
    fn test_silent_note_is_flat_and_transparent() {
        let visual = visualizer().note_visual(70, 0.5, 0.0, (1200.0, 600.0), true);
        assert_eq!(visual.height, 0.0);
        assert_eq!(visual.color.a, 0.0);
    }

    #[test]
    fn test_hsv_to_rgb() {
        let red = Hsva { h: 0.0, s: 1.0, v: 1.0, a: 1.0 };
        assert_eq!(red.to_rgb(), (255, 0, 0));
        let green = Hsva { h: 1.0 / 3.0, s: 1.0, v: 1.0, a: 1.0 };
        assert_eq!(green.to_rgb(), (0, 255, 0));
        let white = Hsva { h: 0.7, s: 0.0, v: 1.0, a: 1.0 };
        assert_eq!(white.to_rgb(), (255, 255, 255));
    }
}
