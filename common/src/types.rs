use serde::{Deserialize, Serialize};

/// Thermostat setpoints are reported in tenths of a degree, so two readings
/// closer than half a tenth are the same setpoint.
const SETPOINT_TOLERANCE_F: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HvacMode {
    Auto,
    AuxHeatOnly,
    Cool,
    Heat,
    Off,
    #[serde(other)]
    Unknown,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::AuxHeatOnly => "auxHeatOnly",
            Self::Cool => "cool",
            Self::Heat => "heat",
            Self::Off => "off",
            Self::Unknown => "unknown",
        }
    }
}

/// One fetch of the thermostat's state. Never updated in place; fetch a new
/// one to observe changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatSnapshot {
    pub identifier: String,
    pub name: String,
    pub mode: HvacMode,
    pub current_temp_f: f64,
    pub heat_setpoint_f: f64,
    pub cool_setpoint_f: f64,
    pub equipment_status: Vec<String>,
}

impl ThermostatSnapshot {
    pub fn is_equipment_running(&self) -> bool {
        !self.equipment_status.is_empty()
    }

    pub fn heat_setpoint_is(&self, setpoint_f: f64) -> bool {
        same_setpoint(self.heat_setpoint_f, setpoint_f)
    }
}

pub fn same_setpoint(a: f64, b: f64) -> bool {
    (a - b).abs() < SETPOINT_TOLERANCE_F
}
