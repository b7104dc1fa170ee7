use serde::{Deserialize, Serialize};

use crate::types::same_setpoint;

/// Heating program for one run. Temperatures are whole degrees Fahrenheit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub heat_on_threshold: i32,
    pub heat_off_threshold: i32,
    pub heat_on_setpoint: i32,
    pub heat_off_setpoint: i32,
}

impl Thresholds {
    /// An inverted or empty deadband would make the program oscillate or never
    /// settle, so it must be strictly ordered.
    pub fn is_valid(&self) -> bool {
        self.heat_on_threshold < self.heat_off_threshold
    }

    pub fn program_band_contains(&self, setpoint_f: f64) -> bool {
        !(setpoint_f < f64::from(self.heat_off_setpoint)
            || setpoint_f > f64::from(self.heat_on_setpoint))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatCall {
    On { threshold: i32, setpoint: i32 },
    Off { threshold: i32, setpoint: i32 },
}

impl HeatCall {
    pub fn setpoint(self) -> i32 {
        match self {
            Self::On { setpoint, .. } | Self::Off { setpoint, .. } => setpoint,
        }
    }
}

/// Reasons adjustment is disabled for the current run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inhibitor {
    CheckOnly,
    OverrideDetected {
        current_setpoint_f: f64,
        low: i32,
        high: i32,
    },
    InvalidThresholds {
        heat_on_threshold: i32,
        heat_off_threshold: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    RequestHold { setpoint: i32 },
    AlreadyAtTarget { setpoint: i32 },
    Inhibited { setpoint: i32 },
    NoChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub current_temp_f: f64,
    pub current_setpoint_f: f64,
    pub heat_call: Option<HeatCall>,
    pub inhibitors: Vec<Inhibitor>,
}

impl Decision {
    pub fn adjust_enabled(&self) -> bool {
        self.inhibitors.is_empty()
    }

    pub fn new_setpoint(&self) -> Option<i32> {
        self.heat_call.map(HeatCall::setpoint)
    }

    pub fn action(&self) -> EngineAction {
        let Some(setpoint) = self.new_setpoint() else {
            return EngineAction::NoChange;
        };

        if !self.adjust_enabled() {
            EngineAction::Inhibited { setpoint }
        } else if same_setpoint(self.current_setpoint_f, f64::from(setpoint)) {
            EngineAction::AlreadyAtTarget { setpoint }
        } else {
            EngineAction::RequestHold { setpoint }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    thresholds: Thresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn decide(
        &self,
        current_temp_f: f64,
        current_setpoint_f: f64,
        check_only: bool,
    ) -> Decision {
        let t = &self.thresholds;
        let mut inhibitors = Vec::new();

        if check_only {
            inhibitors.push(Inhibitor::CheckOnly);
        }

        // A setpoint outside the program means someone changed it by hand.
        if !t.program_band_contains(current_setpoint_f) {
            inhibitors.push(Inhibitor::OverrideDetected {
                current_setpoint_f,
                low: t.heat_off_setpoint,
                high: t.heat_on_setpoint,
            });
        }

        if !t.is_valid() {
            inhibitors.push(Inhibitor::InvalidThresholds {
                heat_on_threshold: t.heat_on_threshold,
                heat_off_threshold: t.heat_off_threshold,
            });
        }

        let heat_call = if current_temp_f <= f64::from(t.heat_on_threshold) {
            Some(HeatCall::On {
                threshold: t.heat_on_threshold,
                setpoint: t.heat_on_setpoint,
            })
        } else if current_temp_f >= f64::from(t.heat_off_threshold) {
            Some(HeatCall::Off {
                threshold: t.heat_off_threshold,
                setpoint: t.heat_off_setpoint,
            })
        } else {
            None
        };

        Decision {
            current_temp_f,
            current_setpoint_f,
            heat_call,
            inhibitors,
        }
    }
}
