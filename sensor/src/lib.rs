//! Room temperature from a TEMPer USB thermometer.

use std::{io, path::PathBuf};

pub mod hidraw;
pub mod temper;

pub use hidraw::{TemperDevice, TemperHandler};
pub use temper::{celsius_to_fahrenheit, Calibration};

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("no TEMPer device found")]
    NoDevice,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sensor returned a {0}-byte report, expected at least 4")]
    ShortReport(usize),
}
