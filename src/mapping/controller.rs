//! MIDI controller routing

use log::{debug, warn};

use super::{LinearMapper, Mapper};
use crate::synth::{Parameter, ParameterStore};

/// Controller that drives hardness by default (channel volume)
pub const DEFAULT_HARDNESS_CC: u8 = 7;
/// Controller that drives brightness by default (expression)
pub const DEFAULT_BRIGHTNESS_CC: u8 = 11;

/// One controller routed to one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerBinding {
    pub controller: u8,
    pub parameter: Parameter,
    pub mapper: LinearMapper,
}

/// Routes controller numbers to parameters of a store
#[derive(Debug, Clone, Default)]
pub struct ControllerMap {
    bindings: Vec<ControllerBinding>,
}

impl ControllerMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// CC7 to hardness and CC11 to brightness, over each parameter's full
    /// range in `store`. Parameters the store lacks are left unbound.
    pub fn with_defaults(store: &ParameterStore) -> Self {
        let mut map = Self::new();
        map.bind_full_range(DEFAULT_HARDNESS_CC, Parameter::Hardness, store);
        map.bind_full_range(DEFAULT_BRIGHTNESS_CC, Parameter::Brightness, store);
        map
    }

    /// Route `controller` to `parameter` over `[min, max]`. Replaces any
    /// existing binding for the controller.
    pub fn bind(&mut self, controller: u8, parameter: Parameter, min: f64, max: f64) {
        self.bindings.retain(|b| b.controller != controller);
        self.bindings.push(ControllerBinding {
            controller,
            parameter,
            mapper: LinearMapper::midi(min, max),
        });
    }

    /// Route `controller` over the parameter's bounds in `store`. Returns
    /// false if the store does not have the parameter.
    pub fn bind_full_range(
        &mut self,
        controller: u8,
        parameter: Parameter,
        store: &ParameterStore,
    ) -> bool {
        match store.bounds(parameter) {
            Some((min, max)) => {
                self.bind(controller, parameter, min, max);
                true
            }
            None => {
                warn!("CC{controller}: instrument has no '{parameter}' parameter, not bound");
                false
            }
        }
    }

    pub fn bindings(&self) -> &[ControllerBinding] {
        &self.bindings
    }

    pub fn lookup(&self, controller: u8) -> Option<&ControllerBinding> {
        self.bindings.iter().find(|b| b.controller == controller)
    }

    /// Apply a controller value to `store`. Returns the parameter written,
    /// if the controller is bound and the store has the parameter.
    pub fn apply(&self, controller: u8, value: u8, store: &ParameterStore) -> Option<Parameter> {
        let binding = self.lookup(controller)?;
        if !store.contains(binding.parameter) {
            return None;
        }
        let mapped = binding.mapper.map(value as f64);
        store.set(binding.parameter, mapped);
        debug!("CC{controller}={value} -> {} = {mapped:.3}", binding.parameter);
        Some(binding.parameter)
    }
}
