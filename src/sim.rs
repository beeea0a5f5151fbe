//! Simulated collaborators for the demo binary and integration tests.
//!
//! These stand in for the thermocouple, PWM heater and rotary encoder that a
//! real board would provide through the [`crate::hardware`] traits.

pub mod encoder;
pub mod thermal;

pub use encoder::{EncoderPin, SimulatedEncoder};
pub use thermal::{FaultInjector, PlantParams, SimulatedHeater, SimulatedThermocouple, ThermalPlant};
