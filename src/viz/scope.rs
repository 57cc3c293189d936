//! Output scope widget for ratatui

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    widgets::{Block, Widget},
};

/// Shows the peak range of recent output per terminal column
pub struct Scope<'a> {
    samples: &'a [f32],
    style: Style,
    block: Option<Block<'a>>,
}

impl<'a> Scope<'a> {
    pub fn new(samples: &'a [f32]) -> Self {
        Self {
            samples,
            style: Style::default(),
            block: None,
        }
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    /// Lowest and highest sample falling in `column` of `width`
    fn column_range(&self, column: usize, width: usize) -> (f32, f32) {
        let len = self.samples.len();
        let start = column * len / width;
        let end = ((column + 1) * len / width).max(start + 1).min(len);
        if start >= end {
            return (0.0, 0.0);
        }
        self.samples[start..end]
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)))
    }

    fn render_scope(&self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let width = area.width as usize;
        let half = area.height as f32 / 2.0;
        let center = area.y as f32 + half;
        let bottom = area.y + area.height - 1;
        let to_row = |value: f32| {
            let row = (center - value.clamp(-1.0, 1.0) * half).floor() as u16;
            row.clamp(area.y, bottom)
        };

        for column in 0..width {
            let (lo, hi) = if self.samples.is_empty() {
                (0.0, 0.0)
            } else {
                self.column_range(column, width)
            };
            let x = area.x + column as u16;
            for y in to_row(hi)..=to_row(lo) {
                buf.set_string(x, y, "│", self.style);
            }
        }
    }
}

impl Widget for Scope<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = match &self.block {
            Some(block) => {
                let inner = block.inner(area);
                block.clone().render(area, buf);
                inner
            }
            None => area,
        };

        self.render_scope(inner_area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_empty() {
        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        Scope::new(&[]).render(area, &mut buf);
        // Silence draws a flat centre line
        assert_eq!(buf[(3, 2)].symbol(), "│");
        assert_eq!(buf[(3, 0)].symbol(), " ");
    }

    #[test]
    fn test_scope_full_scale_fills_column() {
        let samples = [1.0, -1.0];
        let area = Rect::new(0, 0, 1, 6);
        let mut buf = Buffer::empty(area);
        Scope::new(&samples).render(area, &mut buf);
        for y in 0..6 {
            assert_eq!(buf[(0, y)].symbol(), "│");
        }
    }

    #[test]
    fn test_column_range() {
        let samples = [0.1, -0.4, 0.9, 0.2];
        let scope = Scope::new(&samples);
        assert_eq!(scope.column_range(0, 2), (-0.4, 0.1));
        assert_eq!(scope.column_range(1, 2), (0.2, 0.9));
        // More columns than samples repeat the nearest sample
        assert_eq!(scope.column_range(7, 8), (0.2, 0.2));
    }

    #[test]
    fn test_scope_with_block() {
        let samples = vec![0.5; 10];
        let scope = Scope::new(&samples).block(Block::default().title("Test"));
        let area = Rect::new(0, 0, 20, 10);
        let mut buf = Buffer::empty(area);
        scope.render(area, &mut buf);
        assert_eq!(buf[(0, 0)].symbol(), "T");
    }
}
