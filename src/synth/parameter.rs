//! Per-voice parameter store
//!
//! Every voice carries a store of named control values with a default and
//! inclusive bounds. Values live in atomics so the control thread can write
//! while the audio and graphics threads read without tearing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A lock-free `f64` cell built on `AtomicU64` bit casts.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Key identifying a voice parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Scales the volume of the overtones.
    Hardness,
    /// Balances the two overtones against each other.
    Brightness,
    Amplitude,
    /// Stereo position, -1 (left) to 1 (right).
    Pan,
    AttackTime,
    DecayTime,
    /// Base release time, adjusted per note by the decay model.
    ReleaseTime,
    VisualWidth,
    VisualHeight,
    /// Harmonic ratio of the first overtone (additive model).
    FirstOvertone,
    /// Harmonic ratio of the second overtone (additive model).
    SecondOvertone,
    /// Comb delay in periods of the played note (subtractive model).
    Delay,
    Feedforward,
    Feedback,
}

impl Parameter {
    /// Number of distinct keys
    pub const COUNT: usize = 14;

    /// All keys in declaration order
    pub const ALL: [Parameter; Self::COUNT] = [
        Parameter::Hardness,
        Parameter::Brightness,
        Parameter::Amplitude,
        Parameter::Pan,
        Parameter::AttackTime,
        Parameter::DecayTime,
        Parameter::ReleaseTime,
        Parameter::VisualWidth,
        Parameter::VisualHeight,
        Parameter::FirstOvertone,
        Parameter::SecondOvertone,
        Parameter::Delay,
        Parameter::Feedforward,
        Parameter::Feedback,
    ];

    /// Stable identifier used in configuration and preset files
    pub fn name(self) -> &'static str {
        match self {
            Parameter::Hardness => "hardness",
            Parameter::Brightness => "brightness",
            Parameter::Amplitude => "amplitude",
            Parameter::Pan => "pan",
            Parameter::AttackTime => "attack_time",
            Parameter::DecayTime => "decay_time",
            Parameter::ReleaseTime => "release_time",
            Parameter::VisualWidth => "visual_width",
            Parameter::VisualHeight => "visual_height",
            Parameter::FirstOvertone => "first_overtone",
            Parameter::SecondOvertone => "second_overtone",
            Parameter::Delay => "delay",
            Parameter::Feedforward => "feedforward",
            Parameter::Feedback => "feedback",
        }
    }

    /// Look a key up by its identifier
    pub fn from_name(name: &str) -> Result<Self, ParameterError> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == name)
            .ok_or_else(|| ParameterError::UnknownName(name.to_string()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by parameter registration and bulk access.
#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("parameter '{0}' is already registered")]
    AlreadyRegistered(Parameter),

    #[error("parameter '{0}' is not registered")]
    Unregistered(Parameter),

    #[error("unknown parameter name '{0}'")]
    UnknownName(String),

    #[error("parameter '{key}' has invalid bounds [{min}, {max}]")]
    InvalidBounds { key: Parameter, min: f64, max: f64 },
}

/// One row of an instrument's default table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub key: Parameter,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl ParameterSpec {
    pub const fn new(key: Parameter, default: f64, min: f64, max: f64) -> Self {
        Self { key, default, min, max }
    }
}

#[derive(Debug)]
struct Slot {
    value: AtomicF64,
    default: f64,
    min: f64,
    max: f64,
}

/// Keyed store of clamped control values
#[derive(Debug)]
pub struct ParameterStore {
    slots: [Option<Slot>; Parameter::COUNT],
}

impl ParameterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Build a store from an instrument default table
    pub fn from_specs(specs: &[ParameterSpec]) -> Result<Self, ParameterError> {
        let mut store = Self::new();
        for spec in specs {
            store.create(spec.key, spec.default, spec.min, spec.max)?;
        }
        Ok(store)
    }

    /// Register a parameter. Registering the same key twice is a programmer
    /// error and asserts in debug builds.
    pub fn create(
        &mut self,
        key: Parameter,
        default: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ParameterError> {
        if self.slots[key.index()].is_some() {
            debug_assert!(false, "parameter '{key}' registered twice");
            return Err(ParameterError::AlreadyRegistered(key));
        }
        if min.is_nan() || max.is_nan() || min > max {
            return Err(ParameterError::InvalidBounds { key, min, max });
        }

        let default = default.clamp(min, max);
        self.slots[key.index()] = Some(Slot {
            value: AtomicF64::new(default),
            default,
            min,
            max,
        });
        Ok(())
    }

    pub fn contains(&self, key: Parameter) -> bool {
        self.slots[key.index()].is_some()
    }

    /// Registered keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = Parameter> + '_ {
        Parameter::ALL.into_iter().filter(|&key| self.contains(key))
    }

    /// Current value, or `None` if the key is not registered
    pub fn try_get(&self, key: Parameter) -> Option<f64> {
        self.slots[key.index()].as_ref().map(|slot| slot.value.load())
    }

    /// Current value. Unregistered keys assert in debug builds and read as
    /// zero otherwise.
    pub fn get(&self, key: Parameter) -> f64 {
        match self.try_get(key) {
            Some(value) => value,
            None => {
                debug_assert!(false, "parameter '{key}' is not registered");
                0.0
            }
        }
    }

    /// Store a value clamped to the key's bounds. Unregistered keys assert in
    /// debug builds and are ignored otherwise; non-finite values are ignored.
    pub fn set(&self, key: Parameter, value: f64) {
        let Some(slot) = self.slots[key.index()].as_ref() else {
            debug_assert!(false, "parameter '{key}' is not registered");
            return;
        };
        if value.is_finite() {
            slot.value.store(value.clamp(slot.min, slot.max));
        }
    }

    /// `(min, max)` for a registered key
    pub fn bounds(&self, key: Parameter) -> Option<(f64, f64)> {
        self.slots[key.index()]
            .as_ref()
            .map(|slot| (slot.min, slot.max))
    }

    pub fn default_value(&self, key: Parameter) -> Option<f64> {
        self.slots[key.index()].as_ref().map(|slot| slot.default)
    }

    /// Restore a key to its default
    pub fn reset(&self, key: Parameter) {
        if let Some(slot) = self.slots[key.index()].as_ref() {
            slot.value.store(slot.default);
        }
    }

    pub fn reset_all(&self) {
        for slot in self.slots.iter().flatten() {
            slot.value.store(slot.default);
        }
    }

    /// Snapshot of every registered value
    pub fn get_all(&self) -> Vec<(Parameter, f64)> {
        self.keys().map(|key| (key, self.get(key))).collect()
    }

    /// Apply a snapshot. Fails without writing anything if a key is not
    /// registered here.
    pub fn set_all(&self, values: &[(Parameter, f64)]) -> Result<(), ParameterError> {
        if let Some(&(key, _)) = values.iter().find(|(key, _)| !self.contains(*key)) {
            return Err(ParameterError::Unregistered(key));
        }
        for &(key, value) in values {
            self.set(key, value);
        }
        Ok(())
    }

    /// Read every value once, for use over one audio block
    pub fn snapshot(&self) -> BlockSnapshot {
        BlockSnapshot {
            values: std::array::from_fn(|i| {
                self.slots[i].as_ref().map_or(0.0, |slot| slot.value.load())
            }),
        }
    }

    /// Copy every key registered in both stores. Does not allocate.
    pub fn copy_from(&self, other: &ParameterStore) {
        for (mine, theirs) in self.slots.iter().zip(other.slots.iter()) {
            if let (Some(mine), Some(theirs)) = (mine, theirs) {
                mine.value.store(theirs.value.load().clamp(mine.min, mine.max));
            }
        }
    }
}

/// Parameter values frozen at the start of a block. Unregistered keys read
/// as zero.
#[derive(Debug, Clone, Copy)]
pub struct BlockSnapshot {
    values: [f64; Parameter::COUNT],
}

impl BlockSnapshot {
    pub fn get(&self, key: Parameter) -> f64 {
        self.values[key.index()]
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ParameterStore {
        ParameterStore::from_specs(&[
            ParameterSpec::new(Parameter::Hardness, 0.5, 0.0, 1.0),
            ParameterSpec::new(Parameter::Feedback, 0.5, -0.95, 0.95),
            ParameterSpec::new(Parameter::Pan, 0.0, -1.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_defaults_are_loaded() {
        let store = store();
        assert_eq!(store.get(Parameter::Hardness), 0.5);
        assert_eq!(store.default_value(Parameter::Pan), Some(0.0));
        assert_eq!(store.bounds(Parameter::Feedback), Some((-0.95, 0.95)));
    }

    #[test]
    fn test_set_clamps_to_bounds() {
        let store = store();
        store.set(Parameter::Feedback, 1.5);
        assert_eq!(store.get(Parameter::Feedback), 0.95);

        store.set(Parameter::Feedback, -3.0);
        assert_eq!(store.get(Parameter::Feedback), -0.95);

        store.set(Parameter::Hardness, 0.25);
        assert_eq!(store.get(Parameter::Hardness), 0.25);
    }

    #[test]
    fn test_non_finite_writes_are_ignored() {
        let store = store();
        store.set(Parameter::Hardness, f64::NAN);
        store.set(Parameter::Hardness, f64::INFINITY);
        assert_eq!(store.get(Parameter::Hardness), 0.5);
    }

    #[test]
    fn test_try_get_unregistered() {
        let store = store();
        assert_eq!(store.try_get(Parameter::Brightness), None);
        assert!(!store.contains(Parameter::Brightness));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not registered")]
    fn test_get_unregistered_asserts_in_debug() {
        store().get(Parameter::Brightness);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_create_asserts_in_debug() {
        let mut store = store();
        let _ = store.create(Parameter::Hardness, 0.1, 0.0, 1.0);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut store = ParameterStore::new();
        let err = store.create(Parameter::Pan, 0.0, 1.0, -1.0).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidBounds { .. }));
    }

    #[test]
    fn test_default_clamped_into_bounds() {
        let mut store = ParameterStore::new();
        store.create(Parameter::Amplitude, 2.0, 0.0, 1.0).unwrap();
        assert_eq!(store.get(Parameter::Amplitude), 1.0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let store = store();
        store.set(Parameter::Hardness, 0.9);
        store.set(Parameter::Pan, -0.5);
        store.reset(Parameter::Hardness);
        assert_eq!(store.get(Parameter::Hardness), 0.5);
        assert_eq!(store.get(Parameter::Pan), -0.5);

        store.reset_all();
        assert_eq!(store.get(Parameter::Pan), 0.0);
    }

    #[test]
    fn test_get_all_set_all() {
        let source = store();
        source.set(Parameter::Hardness, 0.8);
        source.set(Parameter::Pan, 0.3);
        let snapshot = source.get_all();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0], (Parameter::Hardness, 0.8));

        let target = store();
        target.set_all(&snapshot).unwrap();
        assert_eq!(target.get(Parameter::Hardness), 0.8);
        assert_eq!(target.get(Parameter::Pan), 0.3);
    }

    #[test]
    fn test_set_all_rejects_unknown_keys_without_writing() {
        let target = store();
        let result = target.set_all(&[
            (Parameter::Hardness, 0.9),
            (Parameter::Brightness, 0.1),
        ]);
        assert_eq!(result, Err(ParameterError::Unregistered(Parameter::Brightness)));
        assert_eq!(target.get(Parameter::Hardness), 0.5);
    }

    #[test]
    fn test_copy_from_shared_keys() {
        let mut wide = ParameterStore::new();
        wide.create(Parameter::Hardness, 0.9, 0.0, 1.0).unwrap();
        wide.create(Parameter::Brightness, 0.1, 0.0, 1.0).unwrap();

        let narrow = store();
        narrow.copy_from(&wide);
        assert_eq!(narrow.get(Parameter::Hardness), 0.9);
        assert!(!narrow.contains(Parameter::Brightness));
    }

    #[test]
    fn test_names_round_trip() {
        for key in Parameter::ALL {
            assert_eq!(Parameter::from_name(key.name()), Ok(key));
        }
        assert!(Parameter::from_name("volume").is_err());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let store = store();
        let snapshot = store.snapshot();
        store.set(Parameter::Hardness, 0.1);
        assert_eq!(snapshot.get(Parameter::Hardness), 0.5);
        assert_eq!(snapshot.get(Parameter::Brightness), 0.0);
        assert_eq!(store.snapshot().get(Parameter::Hardness), 0.1);
    }

    #[test]
    fn test_atomic_f64() {
        let cell = AtomicF64::new(1.25);
        assert_eq!(cell.load(), 1.25);
        cell.store(-0.5);
        assert_eq!(cell.load(), -0.5);
    }
}
