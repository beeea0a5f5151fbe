use crate::timing::{Clock, MonotonicClock};
use serde::Deserialize;
use std::time::Instant;

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }
}

/// Individual contributions of one `compute` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTerms {
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    /// Elapsed time used for this sample, in seconds.
    pub dt: f64,
}

impl PidTerms {
    pub fn total(&self) -> f64 {
        self.proportional + self.integral + self.derivative
    }
}

/// PID controller driven by an error signal and the time between calls.
///
/// The integral accumulator is unbounded unless a limit is set with
/// [`PidController::with_integral_limit`].
pub struct PidController<C: Clock = MonotonicClock> {
    gains: PidGains,

    // State
    integral_sum: f64,
    previous_error: f64,
    previous_timestamp: Instant,

    integral_limit: Option<f64>,
    clock: C,
}

impl PidController<MonotonicClock> {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self::with_clock(PidGains::new(kp, ki, kd), MonotonicClock)
    }
}

impl<C: Clock> PidController<C> {
    pub fn with_clock(gains: PidGains, clock: C) -> Self {
        let previous_timestamp = clock.now();
        Self {
            gains,
            integral_sum: 0.0,
            previous_error: 0.0,
            previous_timestamp,
            integral_limit: None,
            clock,
        }
    }

    /// Clamp the integral accumulator to `[-limit, limit]`. Off by default.
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = Some(limit.abs());
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral_sum(&self) -> f64 {
        self.integral_sum
    }

    pub fn previous_error(&self) -> f64 {
        self.previous_error
    }

    /// Compute the control output for `error` (set point minus measurement).
    pub fn compute(&mut self, error: f64) -> f64 {
        self.compute_terms(error).total()
    }

    pub fn compute_terms(&mut self, error: f64) -> PidTerms {
        let now = self.clock.now();

        // A clock that steps backwards yields no elapsed time.
        let dt = now
            .checked_duration_since(self.previous_timestamp)
            .map_or(0.0, |d| d.as_secs_f64());
        let de = error - self.previous_error;

        let proportional = self.gains.kp * error;

        self.integral_sum += error * dt;
        if let Some(limit) = self.integral_limit {
            self.integral_sum = self.integral_sum.clamp(-limit, limit);
        }
        let integral = self.gains.ki * self.integral_sum;

        let derivative = if dt > 0.0 {
            self.gains.kd * (de / dt)
        } else {
            0.0
        };

        self.previous_timestamp = now;
        self.previous_error = error;

        PidTerms {
            proportional,
            integral,
            derivative,
            dt,
        }
    }

    /// Clear accumulated history and restart timing from now.
    pub fn reset(&mut self) {
        self.integral_sum = 0.0;
        self.previous_error = 0.0;
        self.previous_timestamp = self.clock.now();
    }
}
