use crate::error::HardwareError;
use crate::hardware::BinaryPin;

/// Sign assumed for a double step seen before any direction is known.
pub const AMBIGUOUS_DEFAULT_DIRECTION: i32 = 1;

/// Gray-code phase (0..=3) of a pair of channel levels.
///
/// One detent forward walks the pins through `(a, b)` = 00, 10, 11, 01,
/// which maps to phases 0, 1, 2, 3.
pub fn phase(a: bool, b: bool) -> u8 {
    let (a, b) = (a as u8, b as u8);
    (a ^ b) | (b << 1)
}

/// Turns successive phase readings into signed step counts.
///
/// A jump of two phases means a transition was missed; it is reported as two
/// steps in the direction of the last movement. Two consecutive missed
/// transitions cannot be detected and will be miscounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTracker {
    last_phase: u8,
    last_delta: i32,
}

impl PhaseTracker {
    pub fn new(initial_phase: u8) -> Self {
        Self {
            last_phase: initial_phase & 0b11,
            last_delta: 0,
        }
    }

    pub fn last_phase(&self) -> u8 {
        self.last_phase
    }

    pub fn last_delta(&self) -> i32 {
        self.last_delta
    }

    /// Feed the next phase. Returns the step delta: -1, +1, ±2, or 0 when stationary.
    pub fn advance(&mut self, phase: u8) -> i32 {
        let phase = phase & 0b11;
        if phase == self.last_phase {
            return 0;
        }

        let delta = match phase.wrapping_sub(self.last_phase) % 4 {
            1 => 1,
            3 => -1,
            _ => {
                let direction = match self.last_delta.signum() {
                    0 => AMBIGUOUS_DEFAULT_DIRECTION,
                    sign => sign,
                };
                2 * direction
            }
        };

        self.last_phase = phase;
        self.last_delta = delta;
        delta
    }
}

// ============================================================================
// QUADRATURE DECODER - Two pins in, signed steps out
// ============================================================================

pub struct QuadratureDecoder<A, B> {
    channel_a: A,
    channel_b: B,
    tracker: PhaseTracker,
}

impl<A: BinaryPin, B: BinaryPin> QuadratureDecoder<A, B> {
    /// Reads both channels once to establish the starting phase.
    pub fn new(mut channel_a: A, mut channel_b: B) -> Result<Self, HardwareError> {
        let initial = phase(channel_a.read()?, channel_b.read()?);
        Ok(Self {
            channel_a,
            channel_b,
            tracker: PhaseTracker::new(initial),
        })
    }

    pub fn read_phase(&mut self) -> Result<u8, HardwareError> {
        let a = self.channel_a.read()?;
        let b = self.channel_b.read()?;
        Ok(phase(a, b))
    }

    /// Sample both pins and return the signed movement since the last call.
    pub fn get_delta(&mut self) -> Result<i32, HardwareError> {
        let phase = self.read_phase()?;
        Ok(self.tracker.advance(phase))
    }

    pub fn last_phase(&self) -> u8 {
        self.tracker.last_phase()
    }

    pub fn last_delta(&self) -> i32 {
        self.tracker.last_delta()
    }
}
