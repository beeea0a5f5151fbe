//! Encoder module - Quadrature decoding and the polling worker that accumulates it

pub mod decoder;
pub mod worker;

pub use decoder::{phase, PhaseTracker, QuadratureDecoder, AMBIGUOUS_DEFAULT_DIRECTION};
pub use worker::{EncoderWorker, DEFAULT_POLL_INTERVAL};
