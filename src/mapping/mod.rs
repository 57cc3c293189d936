//! Controller mapping
//!
//! Scales raw controller values onto parameter ranges and routes MIDI
//! controllers to parameters.

mod controller;
mod linear;

pub use controller::{ControllerBinding, ControllerMap};
pub use linear::LinearMapper;

/// Trait for mapping functions
pub trait Mapper: Send + Sync {
    /// Map an input value to an output value
    fn map(&self, input: f64) -> f64;
}
