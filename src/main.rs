use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use realtime_control_kernel::config::{load_config, RuntimeConfig, DEFAULT_CONFIG_PATH};
use realtime_control_kernel::error::ControlError;
use realtime_control_kernel::metrics::MetricsReport;
use realtime_control_kernel::sim::{SimulatedEncoder, SimulatedHeater, SimulatedThermocouple, ThermalPlant};
use realtime_control_kernel::{EncoderWorker, QuadratureDecoder, TemperatureController};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Closed-loop temperature control demo on a simulated heater and knob.
#[derive(Parser, Debug)]
#[command(name = "control-demo", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override `run_duration_secs`.
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Override the initial target temperature in °C.
    #[arg(short, long)]
    target_c: Option<f64>,
}

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

fn init_logging(config: &RuntimeConfig) {
    let level = tracing::Level::from_str(&config.log_level).unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_names(true)
        .init();
}

/// Simulated operator: turns the knob a few detents one step at a time.
fn spawn_knob_turner(
    knob: SimulatedEncoder,
    config: &RuntimeConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<Option<thread::JoinHandle<()>>, ControlError> {
    if config.simulation.knob_turn_interval_ms == 0 {
        return Ok(None);
    }
    let interval = Duration::from_millis(config.simulation.knob_turn_interval_ms);
    // Slow enough that the poller sees every transition.
    let step_delay = (config.encoder_poll_interval() * 5).max(Duration::from_millis(1));
    let mut rng = StdRng::seed_from_u64(config.simulation.seed.wrapping_add(1));

    let handle = thread::Builder::new()
        .name("knob".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(interval);
                let steps: i64 = rng.gen_range(-4..=4);
                tracing::debug!(steps, "turning knob");
                for _ in 0..steps.abs() {
                    knob.rotate(steps.signum());
                    thread::sleep(step_delay);
                }
            }
        })
        .map_err(ControlError::Spawn)?;
    Ok(Some(handle))
}

fn print_loop_report(name: &str, report: &MetricsReport) {
    println!(
        "- {}: {} iterations, {} faults, {:.1}% healthy",
        name,
        report.iterations,
        report.faults,
        report.health()
    );
    println!(
        "  cycle P50: {:?}, P99: {:?}, max: {:?}",
        report.cycle_p50, report.cycle_p99, report.cycle_max
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if let Some(secs) = args.duration_secs {
        config.run_duration_secs = secs;
    }
    if let Some(target) = args.target_c {
        config.temperature.target_c = target;
    }
    init_logging(&config);

    tracing::info!("Starting closed-loop control demo");
    tracing::info!("Configuration: {}", args.config);
    tracing::info!(
        "PID gains: kp={} ki={} kd={}",
        config.pid.kp,
        config.pid.ki,
        config.pid.kd
    );

    // ===== Plant and controller =====
    let plant = ThermalPlant::new(config.plant_params());
    let sensor = SimulatedThermocouple::new(
        plant.clone(),
        config.simulation.seed,
        config.simulation.sensor_noise_c,
    );
    let heater = SimulatedHeater::new(plant.clone());
    let mut controller = TemperatureController::new(sensor, heater, config.temperature_settings())?;
    controller.set_target_temperature_c(config.temperature.target_c);

    // ===== Encoder knob =====
    let knob = SimulatedEncoder::new();
    let (pin_a, pin_b) = knob.pins();
    let decoder = QuadratureDecoder::new(pin_a, pin_b)?;
    let mut encoder = EncoderWorker::new(decoder, config.encoder_poll_interval())?;

    encoder.start()?;
    controller.enable()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let knob_handle = spawn_knob_turner(knob.clone(), &config, shutdown.clone())?;

    let run_for = Duration::from_secs(config.run_duration_secs);
    println!("System running for {} seconds...\n", config.run_duration_secs);

    let started = Instant::now();
    let mut knob_steps = 0i64;
    while started.elapsed() < run_for {
        thread::sleep(STATUS_INTERVAL.min(run_for.saturating_sub(started.elapsed())));

        let steps = encoder.drain();
        if steps != 0 {
            knob_steps += steps;
            let target = controller.target_temperature_c() + steps as f64 * config.encoder.degrees_per_step;
            controller.set_target_temperature_c(target);
        }

        tracing::info!(
            "t={:>4.1}s temp={:.2}°C target={:.1}°C heater={:.0}%",
            started.elapsed().as_secs_f64(),
            plant.temperature_c(),
            controller.target_temperature_c(),
            controller.duty_cycle()
        );
    }

    // ===== Shutdown =====
    shutdown.store(true, Ordering::Relaxed);
    if let Some(handle) = knob_handle {
        if handle.join().is_err() {
            tracing::error!("knob thread panicked");
        }
    }
    controller.disable()?;
    encoder.stop();
    encoder.join()?;

    let temperature_report = controller.metrics().report();
    let encoder_report = encoder.metrics().report();

    println!("\n===========================================");
    println!("FINAL CONTROL RESULTS");
    println!("===========================================");
    println!("Final temperature: {:.2}°C", plant.temperature_c());
    println!("Final target: {:.1}°C", controller.target_temperature_c());
    println!(
        "Knob steps: {} counted, {} net position",
        knob_steps + encoder.drain(),
        knob.position()
    );
    println!("Heater duty after disable: {:.0}%", controller.duty_cycle());
    println!("\n=== Loop Metrics ===");
    print_loop_report("Temperature loop", &temperature_report);
    print_loop_report("Encoder poll", &encoder_report);
    println!("===========================================");

    Ok(())
}
