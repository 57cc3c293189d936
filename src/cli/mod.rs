//! CLI interface for Mallet

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mallet::synth::Instrument;

/// Polyphonic marimba and xylophone synthesizer
#[derive(Parser)]
#[command(name = "mallet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play live from MIDI input, or the configured sequence
    Play {
        /// Configuration file path (default: mallet.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured instrument
        #[arg(short, long, value_enum)]
        instrument: Option<Instrument>,

        /// Preset file applied after the configuration
        #[arg(short, long)]
        preset: Option<PathBuf>,

        /// Play the configured sequence instead of listening for MIDI
        #[arg(long)]
        sequence: bool,

        /// Run without the terminal visualizer
        #[arg(long)]
        no_viz: bool,
    },

    /// Render the configured sequence offline and report levels
    Render {
        /// Configuration file path (default: mallet.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured instrument
        #[arg(short, long, value_enum)]
        instrument: Option<Instrument>,

        /// Preset file applied after the configuration
        #[arg(short, long)]
        preset: Option<PathBuf>,

        /// Seconds rendered after the last event
        #[arg(short, long, default_value = "4")]
        tail: f64,
    },

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "mallet.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,

    /// List available audio output devices
    Devices,

    /// List available MIDI input ports
    MidiPorts,

    /// Save the configured parameter values as a preset
    Preset {
        /// Configuration file path (default: mallet.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured instrument
        #[arg(short, long, value_enum)]
        instrument: Option<Instrument>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}
