use std::time::Duration;

use ecobee_remote_common::ThermostatSnapshot;
use tracing::{error, info};

use crate::ecobee::{ThermostatClient, ThermostatError};

pub const HOLD_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Satisfied { value: T, attempts: u32 },
    Exhausted { last: Option<T>, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Calls `attempt` until `is_done` accepts its value, sleeping `interval`
/// after every rejected value, for at most `max_attempts` calls. The total
/// wait on exhaustion is exactly `max_attempts * interval`.
///
/// Errors from `attempt` end the loop immediately.
pub async fn retry_fixed<T, E, F, P>(
    interval: Duration,
    max_attempts: u32,
    mut attempt: F,
    mut is_done: P,
) -> Result<RetryOutcome<T>, E>
where
    F: AsyncFnMut() -> Result<T, E>,
    P: FnMut(&T) -> bool,
{
    let mut last = None;
    for attempts in 1..=max_attempts {
        let value = attempt().await?;
        if is_done(&value) {
            return Ok(RetryOutcome::Satisfied { value, attempts });
        }
        last = Some(value);
        tokio::time::sleep(interval).await;
    }

    Ok(RetryOutcome::Exhausted {
        last,
        attempts: max_attempts,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    Waiting,
    Confirmed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldVerification {
    pub attempts: u32,
    /// Most recent snapshot observed while waiting.
    pub snapshot: Option<ThermostatSnapshot>,
}

/// Polls the thermostat after a hold request until the heat setpoint reads
/// back as the requested value.
#[derive(Debug, Clone)]
pub struct HoldVerifier {
    target_f: f64,
    max_wait_sec: u32,
    interval: Duration,
    state: HoldState,
}

impl HoldVerifier {
    pub fn new(target_f: f64, max_wait_sec: u32) -> Self {
        Self {
            target_f,
            max_wait_sec,
            interval: HOLD_POLL_INTERVAL,
            state: HoldState::Waiting,
        }
    }

    pub fn state(&self) -> HoldState {
        self.state
    }

    pub async fn verify<C: ThermostatClient>(
        &mut self,
        client: &mut C,
    ) -> Result<HoldVerification, ThermostatError> {
        let target_f = self.target_f;
        let outcome = retry_fixed(
            self.interval,
            self.max_wait_sec,
            async || client.fetch_snapshot().await,
            |snapshot: &ThermostatSnapshot| snapshot.heat_setpoint_is(target_f),
        )
        .await?;

        let attempts = outcome.attempts();
        let (state, snapshot) = match outcome {
            RetryOutcome::Satisfied { value, .. } => {
                info!("verified heat hold updated to {target_f}");
                (HoldState::Confirmed, Some(value))
            }
            RetryOutcome::Exhausted { last, .. } => {
                error!(
                    "waited {} sec and heat setpoint was not updated to {target_f}",
                    self.max_wait_sec
                );
                (HoldState::TimedOut, last)
            }
        };

        self.state = state;
        Ok(HoldVerification { attempts, snapshot })
    }
}
