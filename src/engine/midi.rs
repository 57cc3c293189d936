//! MIDI input for Mallet.
//!
//! Parses raw MIDI bytes and feeds note and controller messages from an
//! input port into an [`EngineHandle`].

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};
use thiserror::Error;

use super::EngineHandle;

/// MIDI message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on: channel (0-15), note (0-127), velocity (0-127)
    NoteOn(u8, u8, u8),
    /// Note off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff(u8, u8, u8),
    /// Control change: channel (0-15), controller (0-127), value (0-127)
    ControlChange(u8, u8, u8),
    /// Program change: channel (0-15), program (0-127)
    ProgramChange(u8, u8),
    /// Pitch bend: channel (0-15), value (0-16383, center at 8192)
    PitchBend(u8, u16),
}

/// Errors from decoding raw MIDI bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MidiError {
    #[error("empty MIDI message")]
    Empty,

    #[error("MIDI message with status {status:#04x} needs {expected} bytes, got {actual}")]
    Truncated {
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported MIDI status byte {0:#04x}")]
    Unsupported(u8),
}

impl MidiMessage {
    /// Decode one complete message. Running status is not supported.
    pub fn parse(bytes: &[u8]) -> Result<Self, MidiError> {
        let &status = bytes.first().ok_or(MidiError::Empty)?;
        let channel = status & 0x0F;

        let expected = match status & 0xF0 {
            0x80 | 0x90 | 0xB0 | 0xE0 => 3,
            0xC0 => 2,
            _ => return Err(MidiError::Unsupported(status)),
        };
        if bytes.len() < expected {
            return Err(MidiError::Truncated {
                status,
                expected,
                actual: bytes.len(),
            });
        }

        let data1 = bytes[1] & 0x7F;
        let data2 = bytes.get(2).map_or(0, |b| b & 0x7F);

        Ok(match status & 0xF0 {
            0x80 => MidiMessage::NoteOff(channel, data1, data2),
            // Velocity zero is a note-off by convention
            0x90 if data2 == 0 => MidiMessage::NoteOff(channel, data1, 0),
            0x90 => MidiMessage::NoteOn(channel, data1, data2),
            0xB0 => MidiMessage::ControlChange(channel, data1, data2),
            0xC0 => MidiMessage::ProgramChange(channel, data1),
            _ => MidiMessage::PitchBend(channel, data1 as u16 | (data2 as u16) << 7),
        })
    }

    /// Convert to raw MIDI bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn(ch, note, vel) => vec![0x90 | (ch & 0x0F), note & 0x7F, vel & 0x7F],
            MidiMessage::NoteOff(ch, note, vel) => {
                vec![0x80 | (ch & 0x0F), note & 0x7F, vel & 0x7F]
            }
            MidiMessage::ControlChange(ch, ctrl, val) => {
                vec![0xB0 | (ch & 0x0F), ctrl & 0x7F, val & 0x7F]
            }
            MidiMessage::ProgramChange(ch, prog) => vec![0xC0 | (ch & 0x0F), prog & 0x7F],
            MidiMessage::PitchBend(ch, val) => {
                let lsb = (val & 0x7F) as u8;
                let msb = ((val >> 7) & 0x7F) as u8;
                vec![0xE0 | (ch & 0x0F), lsb, msb]
            }
        }
    }
}

/// Names of the available MIDI input ports.
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("mallet-probe")?;
    midi_in
        .ports()
        .iter()
        .map(|p| midi_in.port_name(p).map_err(Into::into))
        .collect()
}

/// Connect an input port to the engine. `port_name` matches by substring;
/// without it the first port is used.
pub fn connect_input(
    port_name: Option<&str>,
    mut handle: EngineHandle,
) -> Result<MidiInputConnection<()>> {
    let mut midi_in = MidiInput::new("Mallet MIDI Input")?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(anyhow!("No MIDI input ports available"));
    }

    let port = match port_name {
        Some(name) => ports
            .iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|n| n.contains(name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", name))?
            .clone(),
        None => ports[0].clone(),
    };

    let actual_name = midi_in
        .port_name(&port)
        .context("failed to read MIDI port name")?;

    let connection = midi_in
        .connect(
            &port,
            "mallet-input",
            move |_timestamp, bytes, _| match MidiMessage::parse(bytes) {
                Ok(message) => handle.handle_midi(message),
                Err(err) => debug!("ignoring MIDI input: {err}"),
            },
            (),
        )
        .map_err(|err| anyhow!("failed to connect to MIDI port '{}': {}", actual_name, err))?;

    info!("MIDI input connected to: {}", actual_name);

    Ok(connection)
}
