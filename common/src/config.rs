use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::thermostat::Thresholds;

pub const DEFAULT_CONFIG_PATH: &str = "ecobee-remote.conf";
pub const ENV_PREFIX: &str = "ECOBEE_REMOTE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: config::ConfigError,
    },
    #[error("[main] location must not be empty")]
    EmptyLocation,
    #[error("[db] {0} must not be empty")]
    EmptyDbField(&'static str),
    #[error("[sensor] calibration needs a finite non-zero scale (scale={scale}, offset={offset})")]
    InvalidCalibration { scale: f64, offset: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainSection {
    pub location: String,
    pub heat_on_threshold: i32,
    pub heat_off_threshold: i32,
    pub heat_on_setpoint: i32,
    pub heat_off_setpoint: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSection {
    pub influx_host: String,
    #[serde(default = "default_influx_port")]
    pub influx_port: u16,
    pub influx_dbname: String,
}

fn default_influx_port() -> u16 {
    8086
}

/// Linear correction applied to the raw Celsius reading: `scale * c + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub main: MainSection,
    pub db: DbSection,
    #[serde(default)]
    pub sensor: SensorCalibration,
}

impl RemoteConfig {
    /// Reads the INI file at `path`, then applies `ECOBEE_REMOTE_<SECTION>__<KEY>`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// `env` stands in for the process environment when given.
    fn load_with_env(
        path: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let load_err = |source: config::ConfigError| ConfigError::Load {
            path: display.clone(),
            source,
        };

        let settings = config::Config::builder()
            .add_source(config::File::new(&display, config::FileFormat::Ini))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()
            .map_err(load_err)?;

        let loaded: RemoteConfig = settings.try_deserialize().map_err(load_err)?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.location.trim().is_empty() {
            return Err(ConfigError::EmptyLocation);
        }
        if self.db.influx_host.trim().is_empty() {
            return Err(ConfigError::EmptyDbField("influx_host"));
        }
        if self.db.influx_dbname.trim().is_empty() {
            return Err(ConfigError::EmptyDbField("influx_dbname"));
        }

        let SensorCalibration { scale, offset } = self.sensor;
        if !scale.is_finite() || !offset.is_finite() || scale == 0.0 {
            return Err(ConfigError::InvalidCalibration { scale, offset });
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            heat_on_threshold: self.main.heat_on_threshold,
            heat_off_threshold: self.main.heat_off_threshold,
            heat_on_setpoint: self.main.heat_on_setpoint,
            heat_off_setpoint: self.main.heat_off_setpoint,
        }
    }
}

impl fmt::Display for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "location: {}", self.main.location)?;
        writeln!(f, "heat_on_threshold: {}", self.main.heat_on_threshold)?;
        writeln!(f, "heat_off_threshold: {}", self.main.heat_off_threshold)?;
        writeln!(f, "heat_on_setpoint: {}", self.main.heat_on_setpoint)?;
        writeln!(f, "heat_off_setpoint: {}", self.main.heat_off_setpoint)?;
        writeln!(f, "influx_host: {}", self.db.influx_host)?;
        writeln!(f, "influx_port: {}", self.db.influx_port)?;
        writeln!(f, "influx_dbname: {}", self.db.influx_dbname)?;
        writeln!(f, "sensor_scale: {}", self.sensor.scale)?;
        writeln!(f, "sensor_offset: {}", self.sensor.offset)
    }
}
