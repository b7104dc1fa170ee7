use ecobee_remote_common::ConfigError;
use ecobee_remote_sensor::SensorError;

use crate::ecobee::ThermostatError;

pub const EXIT_CONFIG: u8 = 3;
pub const EXIT_SENSOR_UNAVAILABLE: u8 = 4;
pub const EXIT_THERMOSTAT_FETCH_FAILED: u8 = 5;
pub const EXIT_HOLD_REQUEST_FAILED: u8 = 6;
pub const EXIT_HOLD_NOT_CONFIRMED: u8 = 10;
pub const EXIT_PUBLISH_FAILED: u8 = 11;

/// Failures that end a run before a safe control decision can be acted on.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("room sensor unavailable: {0}")]
    SensorUnavailable(#[source] SensorError),
    #[error("failed to fetch thermostat state: {0}")]
    ThermostatFetchFailed(#[source] ThermostatError),
    #[error("hold request failed: {0}")]
    HoldRequestFailed(#[source] ThermostatError),
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::SensorUnavailable(_) => EXIT_SENSOR_UNAVAILABLE,
            Self::ThermostatFetchFailed(_) => EXIT_THERMOSTAT_FETCH_FAILED,
            Self::HoldRequestFailed(_) => EXIT_HOLD_REQUEST_FAILED,
        }
    }
}
