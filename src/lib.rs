pub mod config;
pub mod control;
pub mod encoder;
pub mod error;
pub mod hardware;
pub mod metrics;
pub mod sim;
pub mod timing;
pub mod worker;

pub use control::{ControlLoopWorker, PidController, TemperatureController};
pub use encoder::{EncoderWorker, QuadratureDecoder};
pub use error::{ControlError, ControlResult, HardwareError};
pub use hardware::{BinaryPin, ScalarActuator, ScalarSensor};
