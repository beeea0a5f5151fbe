use realtime_control_kernel::control::{
    ControlLoopWorker, FailurePolicy, PidController, PidGains, TemperatureSettings,
};
use realtime_control_kernel::error::{ControlError, HardwareError};
use realtime_control_kernel::sim::{
    PlantParams, SimulatedEncoder, SimulatedHeater, SimulatedThermocouple, ThermalPlant,
};
use realtime_control_kernel::{EncoderWorker, TemperatureController};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

fn settings() -> TemperatureSettings {
    TemperatureSettings {
        gains: PidGains::new(2.0, 0.1, 0.0),
        pacing: Duration::from_millis(5),
        integral_limit: Some(20.0),
    }
}

#[test]
fn open_thermocouple_turns_heater_off_until_it_recovers() {
    let plant = ThermalPlant::new(PlantParams::default());
    let sensor = SimulatedThermocouple::new(plant.clone(), 11, 0.25);
    let faults = sensor.fault_injector();
    let heater = SimulatedHeater::new(plant.clone());
    let mut controller = TemperatureController::new(sensor, heater, settings()).unwrap();

    controller.set_target_temperature_c(90.0);
    controller.enable().unwrap();
    wait_until(|| plant.heater_percent() == 100.0);

    faults.inject(u32::MAX);
    wait_until(|| controller.metrics().faults() >= 3);
    assert_eq!(plant.heater_percent(), 0.0);
    assert!(controller.is_enabled());

    faults.clear();
    let iterations = controller.metrics().iterations();
    wait_until(|| controller.metrics().iterations() > iterations);
    wait_until(|| plant.heater_percent() > 0.0);

    controller.disable().unwrap();
    assert_eq!(plant.heater_percent(), 0.0);
    assert!(controller.metrics().report().health() < 100.0);
}

#[test]
fn heater_write_failure_is_skipped() {
    let plant = ThermalPlant::new(PlantParams::default());
    let sensor = SimulatedThermocouple::new(plant, 2, 0.0);

    let broken = Arc::new(AtomicBool::new(true));
    let heater_state = broken.clone();
    let heater = move |percent: f64| {
        if heater_state.load(Ordering::SeqCst) && percent > 0.0 {
            Err(HardwareError::Write { what: "pwm channel busy".into() })
        } else {
            Ok(())
        }
    };

    let mut controller = TemperatureController::new(sensor, heater, settings()).unwrap();
    controller.set_target_temperature_c(50.0);
    controller.enable().unwrap();

    wait_until(|| controller.metrics().faults() >= 3);
    assert_eq!(controller.duty_cycle(), 0.0);

    broken.store(false, Ordering::SeqCst);
    wait_until(|| controller.duty_cycle() > 0.0);
    controller.disable().unwrap();
}

#[test]
fn stop_policy_reports_sensor_fault_from_join() {
    let plant = ThermalPlant::new(PlantParams::default());
    let sensor = SimulatedThermocouple::new(plant, 4, 0.0);
    let faults = sensor.fault_injector();

    let mut worker = ControlLoopWorker::new(
        "strict",
        PidController::new(1.0, 0.0, 0.0),
        sensor,
        |_: f64| {
            thread::sleep(Duration::from_millis(1));
            Ok::<(), HardwareError>(())
        },
        FailurePolicy::Stop,
    )
    .unwrap();
    worker.start().unwrap();
    wait_until(|| worker.metrics().iterations() >= 2);

    faults.inject(1);
    let err = worker.join().unwrap_err();
    assert!(matches!(err, ControlError::Hardware(HardwareError::Fault { .. })));
    assert!(!worker.is_running());
    assert_eq!(worker.metrics().faults(), 1);

    // The fault was consumed; a restart samples normally again.
    let before = worker.metrics().iterations();
    worker.start().unwrap();
    wait_until(|| worker.metrics().iterations() > before);
    worker.stop();
    worker.join().unwrap();
}

#[test]
fn encoder_worker_survives_heater_side_faults() {
    // Encoder polling is independent of the temperature loop's health.
    let plant = ThermalPlant::new(PlantParams::default());
    let sensor = SimulatedThermocouple::new(plant.clone(), 8, 0.0);
    let faults = sensor.fault_injector();
    let mut controller =
        TemperatureController::new(sensor, SimulatedHeater::new(plant), settings()).unwrap();

    let knob = SimulatedEncoder::new();
    let (a, b) = knob.pins();
    let mut encoder = EncoderWorker::from_pins(a, b).unwrap();

    faults.inject(u32::MAX);
    controller.enable().unwrap();
    encoder.start().unwrap();

    for _ in 0..6 {
        knob.rotate(1);
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(10));

    controller.disable().unwrap();
    encoder.stop();
    encoder.join().unwrap();

    assert_eq!(encoder.drain(), 6);
    assert_eq!(controller.metrics().iterations(), 0);
    assert!(controller.metrics().faults() > 0);
}
