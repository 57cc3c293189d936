//! Note canvas widget
//!
//! Draws [`NoteVisual`] rectangles from a virtual window (origin bottom-left)
//! into terminal cells. Alpha is folded into brightness since the terminal
//! has no blending.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Widget},
};

use super::visualizer::NoteVisual;

pub struct NoteCanvas<'a> {
    visuals: &'a [NoteVisual],
    /// Size of the virtual window the visuals were laid out in
    window: (f64, f64),
    block: Option<Block<'a>>,
}

impl<'a> NoteCanvas<'a> {
    pub fn new(visuals: &'a [NoteVisual], window: (f64, f64)) -> Self {
        Self {
            visuals,
            window,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    fn render_notes(&self, area: Rect, buf: &mut Buffer) {
        let (window_width, window_height) = self.window;
        if area.width == 0 || area.height == 0 || window_width <= 0.0 || window_height <= 0.0 {
            return;
        }

        let scale_x = area.width as f64 / window_width;
        let scale_y = area.height as f64 / window_height;

        for visual in self.visuals {
            if visual.height <= 0.0 || visual.color.a <= 0.0 {
                continue;
            }

            let (r, g, b) = visual.color.to_rgb();
            let fade = |c: u8| (c as f64 * visual.color.a) as u8;
            let style = Style::default().fg(Color::Rgb(fade(r), fade(g), fade(b)));

            let left = visual.x * scale_x;
            let right = (visual.x + visual.width) * scale_x;
            let top = visual.y + visual.height;

            // Flip y: the virtual origin is bottom-left, cells count down
            let first_row = area.height as f64 - top * scale_y;
            let last_row = area.height as f64 - visual.y * scale_y;

            let columns = cell_span(left, right, area.width);
            let rows = cell_span(first_row, last_row, area.height);

            for row in rows {
                for column in columns.clone() {
                    buf.set_string(area.x + column, area.y + row, "█", style);
                }
            }
        }
    }
}

/// Cells covered by `[from, to)`, at least one wide, clipped to `limit`
fn cell_span(from: f64, to: f64, limit: u16) -> std::ops::Range<u16> {
    if to <= 0.0 || from >= limit as f64 {
        return 0..0;
    }
    let start = from.floor().max(0.0) as u16;
    let end = to.ceil().min(limit as f64) as u16;
    if end <= start {
        start..start + 1
    } else {
        start..end
    }
}

impl Widget for NoteCanvas<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = match &self.block {
            Some(block) => {
                let inner = block.inner(area);
                block.clone().render(area, buf);
                inner
            }
            None => area,
        };

        self.render_notes(inner_area, buf);
    }
}
