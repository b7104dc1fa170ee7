pub mod config;
pub mod measurements;
pub mod metrics;
pub mod thermostat;
pub mod types;

pub use config::{ConfigError, DbSection, MainSection, RemoteConfig, SensorCalibration};
pub use measurements::*;
pub use metrics::{
    extract_thermostat_metrics, room_temperature_metric, Metric, MetricError, MetricValue,
    PollTime, SkippedMetric, WriteBatch,
};
pub use thermostat::{Decision, DecisionEngine, EngineAction, HeatCall, Inhibitor, Thresholds};
pub use types::{same_setpoint, HvacMode, ThermostatSnapshot};
