use std::collections::VecDeque;

use ecobee_remote_common::{HvacMode, ThermostatSnapshot};

use crate::ecobee::{ThermostatClient, ThermostatError};

pub fn snapshot(heat_setpoint_f: f64) -> ThermostatSnapshot {
    ThermostatSnapshot {
        identifier: "311019999999".to_string(),
        name: "Hallway".to_string(),
        mode: HvacMode::Heat,
        current_temp_f: 67.8,
        heat_setpoint_f,
        cool_setpoint_f: 78.0,
        equipment_status: Vec::new(),
    }
}

/// Replays queued snapshots; once the queue drains it keeps returning the
/// last one.
pub struct FakeThermostat {
    queued: VecDeque<ThermostatSnapshot>,
    last: ThermostatSnapshot,
    pub fetches: u32,
    pub holds: Vec<(f64, f64)>,
    pub fail_fetch_after: Option<u32>,
    pub reject_holds: bool,
}

impl FakeThermostat {
    pub fn new(initial: ThermostatSnapshot) -> Self {
        Self {
            queued: VecDeque::new(),
            last: initial,
            fetches: 0,
            holds: Vec::new(),
            fail_fetch_after: None,
            reject_holds: false,
        }
    }

    pub fn then_setpoints(mut self, setpoints: &[f64]) -> Self {
        self.queued.extend(setpoints.iter().copied().map(snapshot));
        self
    }
}

impl ThermostatClient for FakeThermostat {
    async fn fetch_snapshot(&mut self) -> Result<ThermostatSnapshot, ThermostatError> {
        if self.fail_fetch_after.is_some_and(|limit| self.fetches >= limit) {
            return Err(ThermostatError::NoThermostats);
        }
        self.fetches += 1;
        if let Some(next) = self.queued.pop_front() {
            self.last = next;
        }
        Ok(self.last.clone())
    }

    async fn set_hold(&mut self, heat_f: f64, cool_f: f64) -> Result<(), ThermostatError> {
        if self.reject_holds {
            return Err(ThermostatError::Api {
                code: 3,
                message: "Processing error.".to_string(),
            });
        }
        self.holds.push((heat_f, cool_f));
        Ok(())
    }
}
