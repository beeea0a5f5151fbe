//! PID based temperature regulation.
//!
//! A temperature sensor is sampled by a [`ControlLoopWorker`]. The PID output
//! is mapped onto a heater duty cycle: off once the measurement reaches the
//! target, a linear ramp for small errors, fully on beyond
//! [`MAX_ERROR_DEGREES_C`].

use super::pid::{PidController, PidGains};
use super::worker::{ControlLoopWorker, ControlSink, FailurePolicy};
use crate::error::{ControlResult, HardwareError};
use crate::hardware::{ScalarActuator, ScalarSensor};
use crate::metrics::LoopMetrics;
use crate::timing::{Clock, MonotonicClock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// PID output at which the heater is driven at 100%.
pub const MAX_ERROR_DEGREES_C: f64 = 10.0;

pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// Map a PID output onto a heater duty cycle in percent. NaN maps to 0.
pub fn duty_cycle_for(pid_output: f64) -> f64 {
    if pid_output.is_nan() || pid_output <= 0.0 {
        0.0
    } else if pid_output > MAX_ERROR_DEGREES_C {
        100.0
    } else {
        (pid_output / MAX_ERROR_DEGREES_C) * 100.0
    }
}

struct Heater<H> {
    actuator: H,
    duty_cycle: f64,
}

impl<H: ScalarActuator> Heater<H> {
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), HardwareError> {
        self.actuator.write(percent)?;
        self.duty_cycle = percent;
        Ok(())
    }

    /// Best effort; the caller is already handling another fault.
    fn force_off(&mut self) {
        if let Err(e) = self.set_duty_cycle(0.0) {
            tracing::error!("unable to switch heater off: {}", e);
        }
    }
}

/// Worker output stage: duty cycle policy plus the pacing delay.
struct HeaterOutput<H> {
    heater: Arc<Mutex<Heater<H>>>,
    pacing: Duration,
}

impl<H: ScalarActuator> ControlSink for HeaterOutput<H> {
    fn apply(&mut self, output: f64) -> Result<(), HardwareError> {
        let duty = duty_cycle_for(output);
        self.heater.lock().set_duty_cycle(duty)?;
        tracing::debug!(pid_output = output, duty, "heater updated");

        // Paces on every branch. The heater responds far slower than the loop can compute.
        thread::sleep(self.pacing);
        Ok(())
    }

    fn on_fault(&mut self, err: &HardwareError) {
        tracing::warn!("temperature loop fault, heater off: {}", err);
        self.heater.lock().force_off();
    }
}

/// Tuning for a [`TemperatureController`].
#[derive(Debug, Clone, Copy)]
pub struct TemperatureSettings {
    pub gains: PidGains,
    /// Delay after each heater write before the next sample.
    pub pacing: Duration,
    pub integral_limit: Option<f64>,
}

impl Default for TemperatureSettings {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            pacing: DEFAULT_PACING,
            integral_limit: None,
        }
    }
}

// ============================================================================
// TEMPERATURE CONTROLLER - Disabled <-> Enabled
// ============================================================================

/// Sensor or heater failures switch the heater off and skip the sample; the
/// loop keeps running and retries after the pacing delay.
pub struct TemperatureController<S, H, C = MonotonicClock>
where
    S: ScalarSensor + 'static,
    H: ScalarActuator + 'static,
    C: Clock,
{
    worker: ControlLoopWorker<S, HeaterOutput<H>, C>,
    heater: Arc<Mutex<Heater<H>>>,
    is_enabled: bool,
}

impl<S, H> TemperatureController<S, H, MonotonicClock>
where
    S: ScalarSensor + 'static,
    H: ScalarActuator + 'static,
{
    pub fn new(sensor: S, heater: H, settings: TemperatureSettings) -> ControlResult<Self> {
        Self::with_clock(sensor, heater, settings, MonotonicClock)
    }
}

impl<S, H, C> TemperatureController<S, H, C>
where
    S: ScalarSensor + 'static,
    H: ScalarActuator + 'static,
    C: Clock,
{
    pub fn with_clock(
        sensor: S,
        heater: H,
        settings: TemperatureSettings,
        clock: C,
    ) -> ControlResult<Self> {
        let mut pid = PidController::with_clock(settings.gains, clock);
        if let Some(limit) = settings.integral_limit {
            pid = pid.with_integral_limit(limit);
        }

        let heater = Arc::new(Mutex::new(Heater {
            actuator: heater,
            duty_cycle: 0.0,
        }));
        let output = HeaterOutput {
            heater: heater.clone(),
            pacing: settings.pacing,
        };
        let worker = ControlLoopWorker::new(
            "temperature-pid",
            pid,
            sensor,
            output,
            FailurePolicy::Skip {
                backoff: settings.pacing,
            },
        )?;

        Ok(Self {
            worker,
            heater,
            is_enabled: false,
        })
    }

    /// Start regulating. No-op when already enabled.
    pub fn enable(&mut self) -> ControlResult<()> {
        if self.is_enabled {
            return Ok(());
        }
        self.worker.start()?;
        self.is_enabled = true;
        tracing::info!(target_c = self.worker.set_point(), "temperature control enabled");
        Ok(())
    }

    /// Stop regulating and switch the heater off. No-op when already disabled.
    ///
    /// Waits for the in-flight iteration, so no heater write happens after this returns.
    pub fn disable(&mut self) -> ControlResult<()> {
        if !self.is_enabled {
            return Ok(());
        }
        self.worker.stop();
        let joined = self.worker.join();
        self.is_enabled = false;
        self.heater.lock().force_off();
        tracing::info!("temperature control disabled");
        joined
    }

    /// Valid in either state; used by the loop from its next sample on.
    pub fn set_target_temperature_c(&self, temp_c: f64) {
        tracing::info!("setting target temperature: {:.1}°C", temp_c);
        self.worker.set_set_point(temp_c);
    }

    pub fn target_temperature_c(&self) -> f64 {
        self.worker.set_point()
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Last duty cycle successfully written to the heater, in percent.
    pub fn duty_cycle(&self) -> f64 {
        self.heater.lock().duty_cycle
    }

    pub fn metrics(&self) -> &LoopMetrics {
        self.worker.metrics()
    }
}

impl<S, H, C> Drop for TemperatureController<S, H, C>
where
    S: ScalarSensor + 'static,
    H: ScalarActuator + 'static,
    C: Clock,
{
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            tracing::warn!("temperature loop ended with: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ManualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn p_only(pacing_ms: u64) -> TemperatureSettings {
        TemperatureSettings {
            gains: PidGains::new(1.0, 0.0, 0.0),
            pacing: Duration::from_millis(pacing_ms),
            integral_limit: None,
        }
    }

    #[test]
    fn duty_cycle_policy() {
        assert_eq!(duty_cycle_for(-5.0), 0.0);
        assert_eq!(duty_cycle_for(0.0), 0.0);
        assert_eq!(duty_cycle_for(5.0), 50.0);
        assert_eq!(duty_cycle_for(10.0), 100.0);
        assert_eq!(duty_cycle_for(15.0), 100.0);
        assert_eq!(duty_cycle_for(2.5), 25.0);
        assert_eq!(duty_cycle_for(f64::NAN), 0.0);
        assert_eq!(duty_cycle_for(f64::INFINITY), 100.0);
        assert_eq!(duty_cycle_for(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn duty_cycle_is_monotonic_and_bounded() {
        let mut previous = duty_cycle_for(0.0);
        for i in 1..=300 {
            let duty = duty_cycle_for(i as f64 * 0.05);
            assert!(duty >= previous);
            assert!((0.0..=100.0).contains(&duty));
            previous = duty;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn enabled_controller_drives_heater_from_error() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let log = writes.clone();

        let mut controller = TemperatureController::with_clock(
            || Ok::<f64, HardwareError>(50.0),
            move |p: f64| {
                log.lock().push(p);
                Ok::<(), HardwareError>(())
            },
            p_only(1),
            ManualClock::new(),
        )
        .unwrap();

        assert!(!controller.is_enabled());
        controller.set_target_temperature_c(55.0);
        assert_eq!(controller.target_temperature_c(), 55.0);
        assert!(writes.lock().is_empty());

        controller.enable().unwrap();
        assert!(controller.is_enabled());
        wait_until(|| writes.lock().len() >= 2);
        assert_eq!(controller.duty_cycle(), 50.0);

        controller.disable().unwrap();
        assert!(!controller.is_enabled());
        assert_eq!(controller.duty_cycle(), 0.0);

        let after_disable = writes.lock().len();
        thread::sleep(Duration::from_millis(10));
        let writes = writes.lock();
        assert_eq!(writes.len(), after_disable);
        assert_eq!(writes.last(), Some(&0.0));
        assert!(writes[..writes.len() - 1].iter().all(|&p| p == 50.0));
    }

    #[test]
    fn above_target_keeps_heater_off() {
        let last = Arc::new(Mutex::new(f64::NAN));
        let seen = last.clone();

        let mut controller = TemperatureController::with_clock(
            || Ok::<f64, HardwareError>(80.0),
            move |p: f64| {
                *seen.lock() = p;
                Ok::<(), HardwareError>(())
            },
            p_only(1),
            ManualClock::new(),
        )
        .unwrap();
        controller.set_target_temperature_c(60.0);
        controller.enable().unwrap();
        wait_until(|| !last.lock().is_nan());
        controller.disable().unwrap();

        assert_eq!(*last.lock(), 0.0);
    }

    #[test]
    fn sensor_failure_turns_heater_off_and_loop_continues() {
        let failing = Arc::new(AtomicBool::new(false));
        let sensor_state = failing.clone();
        let last = Arc::new(Mutex::new(f64::NAN));
        let seen = last.clone();

        let mut controller = TemperatureController::with_clock(
            move || {
                if sensor_state.load(Ordering::SeqCst) {
                    Err(HardwareError::Fault { what: "thermocouple open".into() })
                } else {
                    Ok(40.0)
                }
            },
            move |p: f64| {
                *seen.lock() = p;
                Ok::<(), HardwareError>(())
            },
            p_only(1),
            ManualClock::new(),
        )
        .unwrap();
        controller.set_target_temperature_c(100.0);
        controller.enable().unwrap();
        wait_until(|| *last.lock() == 100.0);

        failing.store(true, Ordering::SeqCst);
        wait_until(|| controller.metrics().faults() >= 2);
        assert_eq!(*last.lock(), 0.0);
        assert!(controller.is_enabled());

        failing.store(false, Ordering::SeqCst);
        wait_until(|| *last.lock() == 100.0);
        controller.disable().unwrap();
    }

    #[test]
    fn enable_and_disable_are_idempotent() {
        let mut controller = TemperatureController::new(
            || Ok::<f64, HardwareError>(20.0),
            |_: f64| Ok::<(), HardwareError>(()),
            p_only(1),
        )
        .unwrap();

        controller.disable().unwrap();
        controller.enable().unwrap();
        controller.enable().unwrap();
        controller.disable().unwrap();
        controller.disable().unwrap();
        controller.enable().unwrap();
        assert!(controller.is_enabled());
        controller.disable().unwrap();
    }

    #[test]
    fn nan_reading_does_not_poison_heater_output() {
        let reads = Arc::new(AtomicUsize::new(0));
        let seen = reads.clone();
        let writes = Arc::new(Mutex::new(Vec::new()));
        let log = writes.clone();

        let mut controller = TemperatureController::with_clock(
            move || {
                if seen.fetch_add(1, Ordering::SeqCst) == 1 {
                    Ok::<f64, HardwareError>(f64::NAN)
                } else {
                    Ok(20.0)
                }
            },
            move |p: f64| {
                log.lock().push(p);
                Ok::<(), HardwareError>(())
            },
            p_only(1),
            ManualClock::new(),
        )
        .unwrap();
        controller.set_target_temperature_c(25.0);
        controller.enable().unwrap();
        wait_until(|| writes.lock().len() >= 6);
        controller.disable().unwrap();

        let writes = writes.lock();
        assert!(writes.iter().all(|p| p.is_finite()));
        // The fault forced the heater off once; every sample around it drove 50%.
        assert_eq!(writes.iter().filter(|&&p| p == 0.0).count(), 2);
        assert_eq!(writes.last(), Some(&0.0));
        assert_eq!(controller.metrics().faults(), 1);
    }

    #[test]
    fn dropping_enabled_controller_switches_heater_off() {
        let last = Arc::new(Mutex::new(f64::NAN));
        let seen = last.clone();

        let mut controller = TemperatureController::with_clock(
            || Ok::<f64, HardwareError>(20.0),
            move |p: f64| {
                *seen.lock() = p;
                Ok::<(), HardwareError>(())
            },
            p_only(1),
            ManualClock::new(),
        )
        .unwrap();
        controller.set_target_temperature_c(80.0);
        controller.enable().unwrap();
        wait_until(|| *last.lock() == 100.0);

        drop(controller);
        assert_eq!(*last.lock(), 0.0);
    }
}
