//! Parameter presets
//!
//! A preset is a JSON snapshot of an instrument's parameter values.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::synth::instruments::Instrument;
use crate::synth::parameter::{Parameter, ParameterStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub instrument: Instrument,
    pub values: BTreeMap<String, f64>,
}

impl Preset {
    /// Snapshot every value in `store`
    pub fn capture(instrument: Instrument, store: &ParameterStore) -> Self {
        let values = store
            .get_all()
            .into_iter()
            .map(|(key, value)| (key.name().to_string(), value))
            .collect();
        Self { instrument, values }
    }

    /// Write the values into `store`. The preset must be for `instrument`
    /// and every name must be a parameter the store has.
    pub fn apply(&self, instrument: Instrument, store: &ParameterStore) -> Result<()> {
        if self.instrument != instrument {
            bail!(
                "preset is for {} but the instrument is {}",
                self.instrument,
                instrument
            );
        }
        let values = self
            .values
            .iter()
            .map(|(name, &value)| Ok((Parameter::from_name(name)?, value)))
            .collect::<Result<Vec<_>>>()?;
        store.set_all(&values)?;
        Ok(())
    }
}

/// Read a preset file
pub fn load_preset(path: &Path) -> Result<Preset> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read preset {}", path.display()))?;
    let preset: Preset = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse preset {}", path.display()))?;
    info!("loaded {} preset from {}", preset.instrument, path.display());
    Ok(preset)
}

/// Write a preset file
pub fn save_preset(preset: &Preset, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(preset)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write preset {}", path.display()))?;
    info!("saved {} preset to {}", preset.instrument, path.display());
    Ok(())
}
