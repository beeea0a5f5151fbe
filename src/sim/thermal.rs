use crate::error::HardwareError;
use crate::hardware::{check_percent, ScalarActuator, ScalarSensor};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thermocouple converter resolution in °C per bit.
pub const THERMOCOUPLE_RESOLUTION_C: f64 = 0.25;

const MAX_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    pub ambient_c: f64,
    /// Temperature rise per second with the heater at 100% and no losses.
    pub heat_rate_c_per_s: f64,
    /// Fraction of the excess over ambient lost per second.
    pub loss_per_s: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            heat_rate_c_per_s: 4.0,
            loss_per_s: 0.02,
        }
    }
}

struct PlantState {
    params: PlantParams,
    temperature_c: f64,
    heater_percent: f64,
    last_update: Instant,
}

impl PlantState {
    fn advance(&mut self, now: Instant) {
        let mut remaining = now.saturating_duration_since(self.last_update);
        self.last_update = now;

        while !remaining.is_zero() {
            let step = remaining.min(MAX_STEP);
            remaining -= step;
            let dt = step.as_secs_f64();

            let gain = (self.heater_percent / 100.0) * self.params.heat_rate_c_per_s * dt;
            let loss = self.params.loss_per_s * (self.temperature_c - self.params.ambient_c) * dt;
            self.temperature_c += gain - loss;
        }
    }
}

// ============================================================================
// THERMAL PLANT - First-order heater/ambient model on wall time
// ============================================================================

/// Shared handle; the sensor and heater built from it see the same body.
#[derive(Clone)]
pub struct ThermalPlant {
    state: Arc<Mutex<PlantState>>,
}

impl ThermalPlant {
    /// A plant resting at ambient temperature with the heater off.
    pub fn new(params: PlantParams) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState {
                params,
                temperature_c: params.ambient_c,
                heater_percent: 0.0,
                last_update: Instant::now(),
            })),
        }
    }

    pub fn temperature_c(&self) -> f64 {
        let mut state = self.state.lock();
        state.advance(Instant::now());
        state.temperature_c
    }

    pub fn heater_percent(&self) -> f64 {
        self.state.lock().heater_percent
    }

    pub fn set_heater_percent(&self, percent: f64) {
        let mut state = self.state.lock();
        state.advance(Instant::now());
        state.heater_percent = percent;
    }

    /// Step the model forward by `elapsed` without waiting for wall time.
    pub fn run_for(&self, elapsed: Duration) {
        let mut state = self.state.lock();
        let target = state.last_update + elapsed;
        state.advance(target);
    }
}

/// Handle for making a [`SimulatedThermocouple`] fail its next reads.
#[derive(Clone, Default)]
pub struct FaultInjector {
    pending: Arc<AtomicU32>,
}

impl FaultInjector {
    pub fn inject(&self, reads: u32) {
        self.pending.fetch_add(reads, Ordering::SeqCst);
    }

    /// Drop any faults not yet consumed.
    pub fn clear(&self) {
        self.pending.store(0, Ordering::SeqCst);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::SeqCst)
    }

    fn take_one(&self) -> bool {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// ============================================================================
// SIMULATED THERMOCOUPLE
// ============================================================================

pub struct SimulatedThermocouple {
    plant: ThermalPlant,
    rng: StdRng,
    noise_c: f64,
    faults: FaultInjector,
}

impl SimulatedThermocouple {
    pub fn new(plant: ThermalPlant, seed: u64, noise_c: f64) -> Self {
        Self {
            plant,
            rng: StdRng::seed_from_u64(seed),
            noise_c: noise_c.abs(),
            faults: FaultInjector::default(),
        }
    }

    /// Fail the next `reads` reads with an open-circuit fault.
    pub fn inject_faults(&self, reads: u32) {
        self.faults.inject(reads);
    }

    /// Handle for injecting faults after the sensor has moved into a worker.
    pub fn fault_injector(&self) -> FaultInjector {
        self.faults.clone()
    }
}

impl ScalarSensor for SimulatedThermocouple {
    fn read(&mut self) -> Result<f64, HardwareError> {
        if self.faults.take_one() {
            return Err(HardwareError::Fault {
                what: "thermocouple open circuit".to_string(),
            });
        }

        let noise = if self.noise_c > 0.0 {
            self.rng.gen_range(-self.noise_c..self.noise_c)
        } else {
            0.0
        };
        let raw = self.plant.temperature_c() + noise;
        Ok((raw / THERMOCOUPLE_RESOLUTION_C).round() * THERMOCOUPLE_RESOLUTION_C)
    }
}

// ============================================================================
// SIMULATED HEATER
// ============================================================================

pub struct SimulatedHeater {
    plant: ThermalPlant,
}

impl SimulatedHeater {
    pub fn new(plant: ThermalPlant) -> Self {
        Self { plant }
    }
}

impl ScalarActuator for SimulatedHeater {
    fn write(&mut self, percent: f64) -> Result<(), HardwareError> {
        let percent = check_percent(percent)?;
        self.plant.set_heater_percent(percent);
        Ok(())
    }
}
