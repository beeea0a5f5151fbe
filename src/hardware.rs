//! Hardware module - Capability contracts consumed by the control kernel
//!
//! Bus drivers and device wrappers live outside this crate. The kernel only
//! ever talks to them through these three narrow traits.

use crate::error::HardwareError;

pub const PERCENT_MIN: f64 = 0.0;
pub const PERCENT_MAX: f64 = 100.0;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// A zero-argument scalar measurement, e.g. a temperature in °C.
pub trait ScalarSensor: Send {
    fn read(&mut self) -> Result<f64, HardwareError>;
}

/// A binary high/low pin state.
pub trait BinaryPin: Send {
    fn read(&mut self) -> Result<bool, HardwareError>;
}

/// A percent-driven output such as a PWM duty cycle. Accepts values in [0, 100].
pub trait ScalarActuator: Send {
    fn write(&mut self, percent: f64) -> Result<(), HardwareError>;
}

impl<F> ScalarSensor for F
where
    F: FnMut() -> Result<f64, HardwareError> + Send,
{
    fn read(&mut self) -> Result<f64, HardwareError> {
        self()
    }
}

impl<F> BinaryPin for F
where
    F: FnMut() -> Result<bool, HardwareError> + Send,
{
    fn read(&mut self) -> Result<bool, HardwareError> {
        self()
    }
}

impl<F> ScalarActuator for F
where
    F: FnMut(f64) -> Result<(), HardwareError> + Send,
{
    fn write(&mut self, percent: f64) -> Result<(), HardwareError> {
        self(percent)
    }
}

/// Validates a percent value for an actuator write.
pub fn check_percent(value: f64) -> Result<f64, HardwareError> {
    if (PERCENT_MIN..=PERCENT_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(HardwareError::OutOfRange {
            value,
            min: PERCENT_MIN,
            max: PERCENT_MAX,
        })
    }
}
