//! Error types for the control kernel and the hardware it drives.

use thiserror::Error;

/// Result type for control kernel operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Failures reported by sensor, pin and actuator collaborators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HardwareError {
    #[error("Read failed: {what}")]
    Read { what: String },

    #[error("Write failed: {what}")]
    Write { what: String },

    #[error("Value {value} outside accepted range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    /// The device reported a fault condition of its own (e.g. an open thermocouple).
    #[error("Device fault: {what}")]
    Fault { what: String },
}

/// Errors raised by the control kernel itself.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Worker thread '{name}' panicked")]
    WorkerPanicked { name: String },

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Controller state error: {what}")]
    StateError { what: &'static str },

    #[error("Metrics error: {what}")]
    Metrics { what: String },

    #[error("Failed to read config '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
