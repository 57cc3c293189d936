//! Terminal visualization for mallet
//!
//! Provides a TUI interface showing:
//! - One coloured bar per sounding partial
//! - Output scope
//! - Voice count and the hardness/brightness controls

mod canvas;
mod scope;
pub mod visualizer;

pub use canvas::NoteCanvas;
pub use scope::Scope;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};

use crate::engine::{render_graphics, EngineStats};
use crate::synth::parameter::{Parameter, ParameterStore};
use crate::synth::voice::VoiceShared;
use visualizer::NoteVisual;

/// Control change per arrow key press
const CONTROL_STEP: f64 = 0.05;

/// Buffer for storing recent audio samples for visualization
pub struct SampleBuffer {
    samples: Vec<f32>,
    capacity: usize,
    write_pos: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            capacity,
            write_pos: 0,
        }
    }

    /// Push a new sample into the buffer
    pub fn push(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// The most recent `count` samples, oldest first
    pub fn get_recent(&self, count: usize) -> Vec<f32> {
        let count = count.min(self.capacity);
        (self.capacity - count..self.capacity)
            .map(|i| self.samples[(self.write_pos + i) % self.capacity])
            .collect()
    }
}

/// Everything the TUI reads. Shared with the control thread.
pub struct VizState {
    pub sample_buffer: Arc<Mutex<SampleBuffer>>,
    pub running: Arc<AtomicBool>,
    pub voices: Vec<Arc<VoiceShared>>,
    pub controls: Arc<ParameterStore>,
    pub stats: Arc<EngineStats>,
    pub title: String,
}

impl VizState {
    pub fn new(
        buffer_size: usize,
        voices: Vec<Arc<VoiceShared>>,
        controls: Arc<ParameterStore>,
        stats: Arc<EngineStats>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            sample_buffer: Arc::new(Mutex::new(SampleBuffer::new(buffer_size))),
            running: Arc::new(AtomicBool::new(true)),
            voices,
            controls,
            stats,
            title: title.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Rectangles of every live voice
    pub fn visuals(&self) -> Vec<NoteVisual> {
        let mut visuals = Vec::new();
        render_graphics(&self.voices, &mut visuals);
        visuals
    }

    /// Virtual window the visuals are laid out in
    pub fn window(&self) -> (f64, f64) {
        (
            self.controls.get(Parameter::VisualWidth),
            self.controls.get(Parameter::VisualHeight),
        )
    }

    /// Step a control by `delta`. Returns the new value, or None if the
    /// instrument has no such parameter.
    pub fn nudge(&self, key: Parameter, delta: f64) -> Option<f64> {
        let value = self.controls.try_get(key)?;
        self.controls.set(key, value + delta);
        self.controls.try_get(key)
    }
}

/// Run the visualization TUI until quit or `state` is stopped
pub fn run_viz(state: &VizState) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, state);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &VizState,
) -> Result<()> {
    while state.is_running() {
        terminal.draw(|f| draw_ui(f, state))?;

        if event::poll(Duration::from_millis(33))? {
            if let Event::Key(key) = event::read()? {
                match (key.code, key.modifiers) {
                    (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => state.stop(),
                    (KeyCode::Char('c'), KeyModifiers::CONTROL) => state.stop(),
                    (KeyCode::Up, _) => {
                        state.nudge(Parameter::Hardness, CONTROL_STEP);
                    }
                    (KeyCode::Down, _) => {
                        state.nudge(Parameter::Hardness, -CONTROL_STEP);
                    }
                    (KeyCode::Right, _) => {
                        state.nudge(Parameter::Brightness, CONTROL_STEP);
                    }
                    (KeyCode::Left, _) => {
                        state.nudge(Parameter::Brightness, -CONTROL_STEP);
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn draw_ui(f: &mut Frame, state: &VizState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(6),      // Notes
            Constraint::Length(7),   // Scope
            Constraint::Length(3),   // Status
        ])
        .split(area);

    draw_notes(f, chunks[0], state);
    draw_scope(f, chunks[1], state);
    draw_status(f, chunks[2], state);
}

fn draw_notes(f: &mut Frame, area: Rect, state: &VizState) {
    let visuals = state.visuals();
    let canvas = NoteCanvas::new(&visuals, state.window()).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", state.title)),
    );
    f.render_widget(canvas, area);
}

fn draw_scope(f: &mut Frame, area: Rect, state: &VizState) {
    let samples = match state.sample_buffer.lock() {
        Ok(buffer) => buffer.get_recent(area.width as usize * 8),
        Err(_) => Vec::new(),
    };

    let scope = Scope::new(&samples)
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title(" Output "));

    f.render_widget(scope, area);
}

fn draw_status(f: &mut Frame, area: Rect, state: &VizState) {
    let mut spans = vec![
        Span::raw("  Voices: "),
        Span::styled(
            state.stats.active_voices().to_string(),
            Style::default().fg(Color::Green),
        ),
    ];
    for key in [Parameter::Hardness, Parameter::Brightness] {
        if let Some(value) = state.controls.try_get(key) {
            spans.push(Span::raw(format!("  |  {key}: {value:.2}")));
        }
    }
    let dropped = state.stats.dropped_notes();
    if dropped > 0 {
        spans.push(Span::styled(
            format!("  |  dropped: {dropped}"),
            Style::default().fg(Color::Yellow),
        ));
    }
    spans.push(Span::raw("  |  ↑↓ hardness  ←→ brightness  q: quit"));

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineSettings};
    use crate::synth::instruments::Instrument;

    fn state(instrument: Instrument) -> (Engine, VizState) {
        let settings = EngineSettings {
            polyphony: 4,
            ..Default::default()
        };
        let (engine, handle) = Engine::new(instrument, settings).unwrap();
        let state = VizState::new(
            64,
            engine.voice_views(),
            handle.controls().clone(),
            handle.stats().clone(),
            instrument.to_string(),
        );
        (engine, state)
    }

    #[test]
    fn test_sample_buffer_wrap() {
        let mut buffer = SampleBuffer::new(3);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.push(3.0);
        buffer.push(4.0); // Wraps, overwrites first

        assert_eq!(buffer.get_recent(3), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_buffer_get_recent() {
        let mut buffer = SampleBuffer::new(10);
        for i in 0..10 {
            buffer.push(i as f32);
        }

        assert_eq!(buffer.get_recent(3), vec![7.0, 8.0, 9.0]);
        assert_eq!(buffer.get_recent(50).len(), 10);
    }

    #[test]
    fn test_viz_state_running() {
        let (_engine, state) = state(Instrument::Marimba);
        assert!(state.is_running());
        state.stop();
        assert!(!state.is_running());
    }

    #[test]
    fn test_nudge_clamps_to_bounds() {
        let (_engine, state) = state(Instrument::Marimba);
        state.controls.set(Parameter::Hardness, 0.98);
        assert_eq!(state.nudge(Parameter::Hardness, CONTROL_STEP), Some(1.0));
    }

    #[test]
    fn test_nudge_missing_parameter() {
        let (_engine, state) = state(Instrument::Subtractive);
        assert_eq!(state.nudge(Parameter::Brightness, CONTROL_STEP), None);
    }

    #[test]
    fn test_visuals_track_engine() {
        let (mut engine, state) = state(Instrument::Xylophone);
        assert!(state.visuals().is_empty());
        assert_eq!(state.window(), (1200.0, 600.0));

        engine.trigger_on(72, 100);
        let mut buffer = vec![0.0f32; 512];
        engine.render(&mut buffer);
        assert_eq!(state.visuals().len(), 3);
    }
}
