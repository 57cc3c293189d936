//! Configuration schema definitions

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::engine::sequence::SequenceNote;
use crate::engine::{EngineSettings, VoiceStealing};
use crate::mapping::ControllerMap;
use crate::synth::instruments::Instrument;
use crate::synth::parameter::{Parameter, ParameterStore};
use crate::synth::pitch::Tuning;

/// Main configuration for Mallet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MalletConfig {
    /// Audio output settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Master settings
    #[serde(default)]
    pub master: MasterConfig,

    /// Concert pitch
    #[serde(default)]
    pub tuning: Tuning,

    /// Instrument to play
    #[serde(default)]
    pub instrument: Instrument,

    /// MIDI input settings
    #[serde(default)]
    pub midi: MidiConfig,

    /// Virtual window the visualizer lays notes out in
    #[serde(default)]
    pub visual: VisualConfig,

    /// Initial parameter values by name
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,

    /// Notes for offline rendering and scripted playback
    #[serde(default)]
    pub sequence: Vec<SequenceNote>,
}

impl MalletConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        if !(8000..=192000).contains(&self.audio.sample_rate) {
            bail!("Sample rate must be between 8000 and 192000");
        }
        if !(16..=8192).contains(&self.audio.block_size) {
            bail!("Block size must be between 16 and 8192");
        }
        if !(1..=128).contains(&self.audio.polyphony) {
            bail!("Polyphony must be between 1 and 128");
        }

        // Validate master settings
        if !(0.0..=1.0).contains(&self.master.volume) {
            bail!("Master volume must be between 0.0 and 1.0");
        }
        if !(400.0..=480.0).contains(&self.tuning.a4) {
            bail!("Tuning reference a4 must be between 400 and 480 Hz");
        }

        for dimension in [self.visual.width, self.visual.height] {
            if !(1.0..=4096.0).contains(&dimension) {
                bail!("Visual width and height must be between 1 and 4096");
            }
        }

        let definition = self.instrument.definition();
        for name in self.parameters.keys() {
            self.instrument_parameter(name)?;
        }

        for binding in &self.midi.controllers {
            if binding.controller > 127 {
                bail!("Controller number {} is out of range", binding.controller);
            }
            self.instrument_parameter(&binding.parameter)?;
            if let (Some(min), Some(max)) = (binding.min, binding.max) {
                if !min.is_finite() || !max.is_finite() {
                    bail!("Controller {} has a non-finite range", binding.controller);
                }
            }
        }

        for (i, note) in self.sequence.iter().enumerate() {
            if !note.time.is_finite() || note.time < 0.0 {
                bail!("Sequence entry {} has an invalid time {}", i, note.time);
            }
            if note.note > 127 {
                bail!("Sequence entry {} has note {} outside 0..=127", i, note.note);
            }
            if !(1..=127).contains(&note.velocity) {
                bail!("Sequence entry {} has velocity {} outside 1..=127", i, note.velocity);
            }
            if let Some(duration) = note.duration {
                if !duration.is_finite() || duration <= 0.0 {
                    bail!("Sequence entry {} has an invalid duration {}", i, duration);
                }
            }
        }

        log::debug!(
            "configuration valid for {} ({} sequence notes)",
            definition.name,
            self.sequence.len()
        );
        Ok(())
    }

    /// Resolve a parameter name the chosen instrument has
    fn instrument_parameter(&self, name: &str) -> Result<Parameter> {
        let key = Parameter::from_name(name)?;
        if self.instrument.definition().spec(key).is_none() {
            bail!("Instrument '{}' has no parameter '{}'", self.instrument, name);
        }
        Ok(key)
    }

    /// Settings for building the engine
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            sample_rate: self.audio.sample_rate as f64,
            block_size: self.audio.block_size,
            polyphony: self.audio.polyphony,
            stealing: self.audio.stealing,
            volume: self.master.volume,
            tuning: self.tuning,
        }
    }

    /// Initial control values: the visual window, then named parameters
    pub fn initial_parameters(&self) -> Result<Vec<(Parameter, f64)>> {
        let mut values = vec![
            (Parameter::VisualWidth, self.visual.width),
            (Parameter::VisualHeight, self.visual.height),
        ];
        for (name, &value) in &self.parameters {
            values.push((self.instrument_parameter(name)?, value));
        }
        Ok(values)
    }

    /// Controller routing for `store`. Without configured controllers the
    /// default routing is used.
    pub fn controller_map(&self, store: &ParameterStore) -> Result<ControllerMap> {
        if self.midi.controllers.is_empty() {
            return Ok(ControllerMap::with_defaults(store));
        }

        let mut map = ControllerMap::new();
        for binding in &self.midi.controllers {
            let key = self.instrument_parameter(&binding.parameter)?;
            let Some((low, high)) = store.bounds(key) else {
                bail!("Parameter '{}' is not available", binding.parameter);
            };
            map.bind(
                binding.controller,
                key,
                binding.min.unwrap_or(low),
                binding.max.unwrap_or(high),
            );
        }
        Ok(map)
    }

    /// Length of the sequence in seconds, including held notes
    pub fn sequence_length(&self) -> f64 {
        self.sequence
            .iter()
            .map(|n| n.time + n.duration.unwrap_or(0.0))
            .fold(0.0, f64::max)
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 48000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per voice pass (default: 512)
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Number of voices (default: 32)
    #[serde(default = "default_polyphony")]
    pub polyphony: usize,

    /// Behaviour when every voice is busy
    #[serde(default)]
    pub stealing: VoiceStealing,

    /// Output device name (None = default device)
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            polyphony: default_polyphony(),
            stealing: VoiceStealing::default(),
            device: None,
        }
    }
}

fn default_sample_rate() -> u32 { 48000 }
fn default_block_size() -> usize { 512 }
fn default_polyphony() -> usize { 32 }

/// Master settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Master volume 0.0-1.0 (default: 0.8)
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self { volume: default_volume() }
    }
}

fn default_volume() -> f64 { 0.8 }

/// MIDI input configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Input port name substring (None = first port)
    pub port: Option<String>,

    /// Controller routing; empty uses CC7 -> hardness, CC11 -> brightness
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
}

/// One controller routed to a parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub controller: u8,

    /// Parameter name
    pub parameter: String,

    /// Value at controller 0 (default: parameter minimum)
    pub min: Option<f64>,

    /// Value at controller 127 (default: parameter maximum)
    pub max: Option<f64>,
}

/// Visualizer window
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisualConfig {
    #[serde(default = "default_visual_width")]
    pub width: f64,

    #[serde(default = "default_visual_height")]
    pub height: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            width: default_visual_width(),
            height: default_visual_height(),
        }
    }
}

fn default_visual_width() -> f64 { 1200.0 }
fn default_visual_height() -> f64 { 600.0 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_audio_config() {
        let yaml = "sample_rate: 44100";
        let config: AudioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 512); // default
        assert_eq!(config.polyphony, 32);
        assert_eq!(config.stealing, VoiceStealing::Oldest);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: MalletConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.instrument, Instrument::Marimba);
        assert_eq!(config.tuning.a4, 440.0);
        assert_eq!(config.master.volume, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sequence_note() {
        let yaml = r#"
- time: 0.5
  note: 60
- time: 1.0
  note: 67
  duration: 0.25
  velocity: 90
"#;
        let notes: Vec<SequenceNote> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(notes[0].velocity, 100);
        assert_eq!(notes[0].duration, None);
        assert_eq!(notes[1].duration, Some(0.25));
    }

    #[test]
    fn test_config_validation() {
        let mut config = MalletConfig::default();
        config.parameters.insert("hardness".to_string(), 0.9);
        assert!(config.validate().is_ok());

        config.master.volume = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut config = MalletConfig::default();
        config.parameters.insert("volume".to_string(), 0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parameter_must_belong_to_instrument() {
        let mut config = MalletConfig {
            instrument: Instrument::Subtractive,
            ..Default::default()
        };
        config.parameters.insert("feedback".to_string(), 0.2);
        assert!(config.validate().is_ok());

        config.parameters.insert("hardness".to_string(), 0.2);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("hardness"), "{err}");
    }

    #[test]
    fn test_invalid_sequence_rejected() {
        let mut config = MalletConfig::default();
        config.sequence.push(SequenceNote {
            time: -1.0,
            note: 60,
            duration: None,
            velocity: 100,
        });
        assert!(config.validate().is_err());

        config.sequence[0] = SequenceNote {
            time: 0.0,
            note: 200,
            duration: None,
            velocity: 100,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_parameters_include_window() {
        let mut config = MalletConfig::default();
        config.visual.width = 800.0;
        config.parameters.insert("pan".to_string(), -0.5);

        let values = config.initial_parameters().unwrap();
        assert!(values.contains(&(Parameter::VisualWidth, 800.0)));
        assert!(values.contains(&(Parameter::Pan, -0.5)));
    }

    #[test]
    fn test_controller_map_from_config() {
        let mut config = MalletConfig::default();
        let store = config.instrument.definition().store().unwrap();
        assert_eq!(config.controller_map(&store).unwrap().bindings().len(), 2);

        config.midi.controllers.push(ControllerConfig {
            controller: 1,
            parameter: "pan".to_string(),
            min: Some(-0.5),
            max: None,
        });
        let map = config.controller_map(&store).unwrap();
        assert_eq!(map.bindings().len(), 1);
        assert_eq!(map.lookup(1).unwrap().mapper.output_range(), (-0.5, 1.0));
    }

    #[test]
    fn test_sequence_length() {
        let mut config = MalletConfig::default();
        assert_eq!(config.sequence_length(), 0.0);
        config.sequence = vec![
            SequenceNote { time: 1.0, note: 60, duration: Some(2.0), velocity: 100 },
            SequenceNote { time: 2.5, note: 62, duration: None, velocity: 100 },
        ];
        assert_eq!(config.sequence_length(), 3.0);
    }
}
