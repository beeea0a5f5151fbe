use crate::error::HardwareError;
use crate::hardware::BinaryPin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    A,
    B,
}

/// A rotary knob whose position can be turned from any thread.
///
/// The two pins it hands out read the Gray-coded levels of the current
/// position, one phase per step.
#[derive(Clone, Default)]
pub struct SimulatedEncoder {
    position: Arc<AtomicI64>,
}

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move by `steps` phases; positive is clockwise.
    pub fn rotate(&self, steps: i64) {
        self.position.fetch_add(steps, Ordering::SeqCst);
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn pins(&self) -> (EncoderPin, EncoderPin) {
        (
            EncoderPin {
                channel: Channel::A,
                position: self.position.clone(),
            },
            EncoderPin {
                channel: Channel::B,
                position: self.position.clone(),
            },
        )
    }
}

pub struct EncoderPin {
    channel: Channel,
    position: Arc<AtomicI64>,
}

impl BinaryPin for EncoderPin {
    fn read(&mut self) -> Result<bool, HardwareError> {
        // Forward order of (a, b): 00, 10, 11, 01.
        let phase = self.position.load(Ordering::SeqCst).rem_euclid(4);
        Ok(match self.channel {
            Channel::A => phase == 1 || phase == 2,
            Channel::B => phase >= 2,
        })
    }
}
