//! Mallet - polyphonic marimba and xylophone synthesizer
//!
//! Every sounding note is its own voice: a few enveloped oscillators whose
//! levels are published for a visualizer that draws one coloured bar per
//! partial. Voices live in a fixed pool on the audio thread and free
//! themselves once their fundamental has died away.

pub mod config;
pub mod mapping;
pub mod synth;
pub mod engine;
pub mod viz;

pub use config::MalletConfig;
pub use engine::{Engine, EngineHandle};
pub use synth::Instrument;
