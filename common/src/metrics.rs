use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};

use crate::{
    measurements::{
        EQUIPMENT_FURNACE, LOCATION_THERMOSTAT, MEASUREMENT_EQUIPMENT_STATUS,
        MEASUREMENT_SET_POINT_F, MEASUREMENT_TEMPERATURE_F, OPERATION_HEAT, TAG_EQUIPMENT,
        TAG_LOCATION, TAG_OPERATION,
    },
    types::ThermostatSnapshot,
};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// The single instant every metric of a run is stamped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTime(DateTime<Utc>);

impl PollTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Whole seconds scaled to nanoseconds; sub-second precision is dropped so
    /// a run lands on the same second boundary as the rest of the series.
    pub fn timestamp_nanos(&self) -> i64 {
        self.0.timestamp().saturating_mul(NANOS_PER_SECOND)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Float(f64),
    Integer(i64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}i"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("measurement name is empty")]
    EmptyMeasurement,
    #[error("tag with empty key or value ({key:?}={value:?})")]
    EmptyTag { key: String, value: String },
    #[error("value {0} is not a finite number")]
    NonFiniteValue(f64),
    #[error("{0:?} contains a control character")]
    ControlCharacter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(measurement: impl Into<String>, value: MetricValue) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            value,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), MetricError> {
        if self.measurement.is_empty() {
            return Err(MetricError::EmptyMeasurement);
        }
        // Line protocol has no escape for newlines; one would split the point.
        if let Some(name) = std::iter::once(&self.measurement)
            .chain(self.tags.iter().flat_map(|(key, value)| [key, value]))
            .find(|name| name.chars().any(char::is_control))
        {
            return Err(MetricError::ControlCharacter(name.clone()));
        }
        if let Some((key, value)) = self
            .tags
            .iter()
            .find(|(key, value)| key.is_empty() || value.is_empty())
        {
            return Err(MetricError::EmptyTag {
                key: key.clone(),
                value: value.clone(),
            });
        }
        if let MetricValue::Float(value) = self.value {
            if !value.is_finite() {
                return Err(MetricError::NonFiniteValue(value));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.measurement)?;
        for (key, value) in &self.tags {
            write!(f, " {key}={value}")?;
        }
        write!(f, " value={}", self.value)
    }
}

pub fn room_temperature_metric(location: &str, temp_f: f64) -> Metric {
    Metric::new(MEASUREMENT_TEMPERATURE_F, MetricValue::Float(temp_f))
        .with_tag(TAG_LOCATION, location)
}

pub fn extract_thermostat_metrics(snapshot: &ThermostatSnapshot, metrics: &mut Vec<Metric>) {
    metrics.push(
        Metric::new(
            MEASUREMENT_TEMPERATURE_F,
            MetricValue::Float(snapshot.current_temp_f),
        )
        .with_tag(TAG_LOCATION, LOCATION_THERMOSTAT),
    );

    metrics.push(
        Metric::new(
            MEASUREMENT_SET_POINT_F,
            MetricValue::Float(snapshot.heat_setpoint_f),
        )
        .with_tag(TAG_OPERATION, OPERATION_HEAT),
    );

    let running = i64::from(snapshot.is_equipment_running());
    metrics.push(
        Metric::new(MEASUREMENT_EQUIPMENT_STATUS, MetricValue::Integer(running))
            .with_tag(TAG_EQUIPMENT, EQUIPMENT_FURNACE),
    );
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub value: MetricValue,
    pub timestamp_ns: i64,
}

impl Point {
    pub fn write_line(&self, out: &mut String) {
        escape_into(out, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            out.push(',');
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(out, value, &[',', '=', ' ']);
        }
        out.push_str(" value=");
        out.push_str(&self.value.to_string());
        out.push(' ');
        out.push_str(&self.timestamp_ns.to_string());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMetric {
    pub index: usize,
    pub metric: Metric,
    pub error: MetricError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    points: Vec<Point>,
}

impl WriteBatch {
    /// Converts a run's metrics into points sharing `poll_time`. Malformed
    /// metrics are returned separately and do not stop the rest.
    pub fn from_metrics(metrics: &[Metric], poll_time: PollTime) -> (Self, Vec<SkippedMetric>) {
        let timestamp_ns = poll_time.timestamp_nanos();
        let mut points = Vec::with_capacity(metrics.len());
        let mut skipped = Vec::new();

        for (index, metric) in metrics.iter().enumerate() {
            if let Err(error) = metric.validate() {
                skipped.push(SkippedMetric {
                    index,
                    metric: metric.clone(),
                    error,
                });
                continue;
            }

            points.push(Point {
                measurement: metric.measurement.clone(),
                tags: metric.tags.clone(),
                value: metric.value,
                timestamp_ns,
            });
        }

        (Self { points }, skipped)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_line_protocol(&self) -> String {
        let mut out = String::new();
        for point in &self.points {
            point.write_line(&mut out);
            out.push('\n');
        }
        out
    }
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for ch in raw.chars() {
        if ch == '\\' || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}
