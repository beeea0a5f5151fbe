//! Control module - PID computation, the sampling worker that drives it, and
//! the temperature regulation policy built on both.

pub mod pid;
pub mod temperature;
pub mod worker;

pub use pid::{PidController, PidGains, PidTerms};
pub use temperature::{duty_cycle_for, TemperatureController, TemperatureSettings, MAX_ERROR_DEGREES_C};
pub use worker::{ControlLoopWorker, ControlSink, FailurePolicy};
