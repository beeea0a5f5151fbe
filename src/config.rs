//! Runtime configuration loaded from a TOML file.
//!
//! Every section is optional; anything left out falls back to the defaults
//! below.

use crate::control::{PidGains, TemperatureSettings};
use crate::error::{ControlError, ControlResult};
use crate::sim::PlantParams;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/system_config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub log_level: String,
    pub run_duration_secs: u64,
    pub pid: PidGains,
    pub temperature: TemperatureConfig,
    pub encoder: EncoderConfig,
    pub simulation: SimulationConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            run_duration_secs: 10,
            pid: PidGains::default(),
            temperature: TemperatureConfig::default(),
            encoder: EncoderConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    pub target_c: f64,
    pub pacing_ms: u64,
    pub integral_limit: Option<f64>,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            target_c: 60.0,
            pacing_ms: 1000,
            integral_limit: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub poll_interval_us: u64,
    /// Target temperature change per encoder step.
    pub degrees_per_step: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: 1000,
            degrees_per_step: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub ambient_c: f64,
    pub heat_rate_c_per_s: f64,
    pub loss_per_s: f64,
    pub sensor_noise_c: f64,
    pub seed: u64,
    /// How often the simulated operator turns the knob; 0 disables it.
    pub knob_turn_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let plant = PlantParams::default();
        Self {
            ambient_c: plant.ambient_c,
            heat_rate_c_per_s: plant.heat_rate_c_per_s,
            loss_per_s: plant.loss_per_s,
            sensor_noise_c: 0.25,
            seed: 42,
            knob_turn_interval_ms: 2500,
        }
    }
}

impl RuntimeConfig {
    pub fn temperature_settings(&self) -> TemperatureSettings {
        TemperatureSettings {
            gains: self.pid,
            pacing: Duration::from_millis(self.temperature.pacing_ms),
            integral_limit: self.temperature.integral_limit,
        }
    }

    pub fn encoder_poll_interval(&self) -> Duration {
        Duration::from_micros(self.encoder.poll_interval_us)
    }

    pub fn plant_params(&self) -> PlantParams {
        PlantParams {
            ambient_c: self.simulation.ambient_c,
            heat_rate_c_per_s: self.simulation.heat_rate_c_per_s,
            loss_per_s: self.simulation.loss_per_s,
        }
    }
}

pub fn parse_config(path: &str, contents: &str) -> ControlResult<RuntimeConfig> {
    toml::from_str(contents).map_err(|source| ControlError::ConfigParse {
        path: path.to_string(),
        source,
    })
}

/// Load `path`, or the defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> ControlResult<RuntimeConfig> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config = parse_config(&shown, &contents)?;
            tracing::info!(path = %shown, "loaded configuration");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %shown, "no config file, using defaults");
            Ok(RuntimeConfig::default())
        }
        Err(source) => Err(ControlError::ConfigIo {
            path: shown,
            source,
        }),
    }
}
