use std::{io::Write, process::ExitCode};

use ecobee_remote_common::{
    extract_thermostat_metrics, room_temperature_metric, DbSection, DecisionEngine, EngineAction,
    HeatCall, Inhibitor, Metric, PollTime, RemoteConfig, SensorCalibration, ThermostatSnapshot,
};
use ecobee_remote_sensor::{Calibration, SensorError, TemperHandler};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::Cli,
    ecobee::{EcobeeClient, ThermostatClient},
    error::{RunError, EXIT_HOLD_NOT_CONFIRMED, EXIT_PUBLISH_FAILED},
    influx::InfluxPublisher,
    verify::{HoldState, HoldVerifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishStatus {
    #[default]
    Skipped,
    Published,
    Failed,
}

/// How a run that was not aborted ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOutcome {
    pub hold: Option<HoldState>,
    pub publish: PublishStatus,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        if self.hold == Some(HoldState::TimedOut) {
            EXIT_HOLD_NOT_CONFIRMED
        } else if self.publish == PublishStatus::Failed {
            EXIT_PUBLISH_FAILED
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControlOptions {
    pub check_only: bool,
    pub max_wait_sec: u32,
}

pub async fn run(cli: Cli) -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn execute(cli: &Cli) -> Result<RunOutcome, RunError> {
    let config = RemoteConfig::load(&cli.config)?;
    if cli.dump_config {
        print!("{config}");
        return Ok(RunOutcome::default());
    }

    let poll_time = PollTime::now();
    let mut metrics = Vec::new();

    let (room_temp_f, room_metric) =
        read_temperature(&TemperHandler::new(), config.sensor, &config.main.location)
            .map_err(RunError::SensorUnavailable)?;
    metrics.push(room_metric);

    let mut client = EcobeeClient::from_token_file(&cli.ecobee_config)
        .await
        .map_err(RunError::ThermostatFetchFailed)?;
    let engine = DecisionEngine::new(config.thresholds());
    let options = ControlOptions {
        check_only: cli.check_only,
        max_wait_sec: cli.max_wait_sec,
    };
    let hold = control_pass(&engine, options, room_temp_f, &mut client, &mut metrics).await?;

    let publish = report(
        &mut std::io::stdout(),
        cli.no_stats,
        &config.db,
        &metrics,
        poll_time,
    )
    .await;

    Ok(RunOutcome { hold, publish })
}

/// Prints every metric of the run to `out`, then publishes them unless
/// `no_stats` is set.
pub async fn report(
    out: &mut impl Write,
    no_stats: bool,
    db: &DbSection,
    metrics: &[Metric],
    poll_time: PollTime,
) -> PublishStatus {
    for metric in metrics {
        if let Err(err) = writeln!(out, "{metric}") {
            warn!("failed to print metrics: {err}");
            break;
        }
    }

    if no_stats {
        info!("--no-stats given, not publishing");
        return PublishStatus::Skipped;
    }
    publish(db, metrics, poll_time).await
}

/// Reads the first TEMPer device in Fahrenheit along with its `TemperatureF`
/// metric for `location`.
pub fn read_temperature(
    handler: &TemperHandler,
    calibration: SensorCalibration,
    location: &str,
) -> Result<(f64, Metric), SensorError> {
    let device = handler.first_device()?.with_calibration(Calibration {
        scale: calibration.scale,
        offset: calibration.offset,
    });
    let temp_f = device.read_fahrenheit()?;
    info!("{location} temperature {temp_f:.1} from {}", device.name);
    Ok((temp_f, room_temperature_metric(location, temp_f)))
}

/// Fetches thermostat state, decides and, when allowed, applies and verifies
/// a new heat hold. The snapshot metrics of the run are appended to
/// `metrics`; that is the post-hold snapshot when a hold was requested.
pub async fn control_pass<C: ThermostatClient>(
    engine: &DecisionEngine,
    options: ControlOptions,
    room_temp_f: f64,
    client: &mut C,
    metrics: &mut Vec<Metric>,
) -> Result<Option<HoldState>, RunError> {
    let mut snapshot = client
        .fetch_snapshot()
        .await
        .map_err(RunError::ThermostatFetchFailed)?;
    log_status(&snapshot);

    let decision = engine.decide(room_temp_f, snapshot.heat_setpoint_f, options.check_only);
    match decision.heat_call {
        Some(HeatCall::On {
            threshold,
            setpoint,
        }) => info!("heat on: room {room_temp_f:.1} <= {threshold}, target {setpoint}"),
        Some(HeatCall::Off {
            threshold,
            setpoint,
        }) => info!("heat off: room {room_temp_f:.1} >= {threshold}, target {setpoint}"),
        None => {}
    }
    for inhibitor in &decision.inhibitors {
        match inhibitor {
            Inhibitor::CheckOnly => info!("check-only run, thermostat will not be changed"),
            Inhibitor::OverrideDetected {
                current_setpoint_f,
                low,
                high,
            } => warn!(
                "heat setpoint {current_setpoint_f} is outside {low}..={high}, \
                 assuming a manual override and disabling adjustment"
            ),
            Inhibitor::InvalidThresholds {
                heat_on_threshold,
                heat_off_threshold,
            } => error!(
                "heat_on_threshold {heat_on_threshold} must be below heat_off_threshold \
                 {heat_off_threshold}, disabling adjustment"
            ),
        }
    }

    let mut hold = None;
    match decision.action() {
        EngineAction::RequestHold { setpoint } => {
            info!(
                "room at {room_temp_f:.1}, changing heat hold from {} to {setpoint}",
                snapshot.heat_setpoint_f
            );
            let target_f = f64::from(setpoint);
            client
                .set_hold(target_f, target_f)
                .await
                .map_err(RunError::HoldRequestFailed)?;

            let mut verifier = HoldVerifier::new(target_f, options.max_wait_sec);
            let verification = verifier
                .verify(client)
                .await
                .map_err(RunError::ThermostatFetchFailed)?;
            debug!("hold check took {} polls", verification.attempts);
            if let Some(latest) = verification.snapshot {
                snapshot = latest;
                log_status(&snapshot);
            }
            hold = Some(verifier.state());
        }
        EngineAction::AlreadyAtTarget { setpoint } => {
            info!("heat setpoint already set to {setpoint}, skipping");
        }
        EngineAction::Inhibited { setpoint } => {
            info!("would set heat hold to {setpoint}, adjustment disabled");
        }
        EngineAction::NoChange => {
            info!("room at {room_temp_f:.1} is between thresholds, no change");
        }
    }

    extract_thermostat_metrics(&snapshot, metrics);
    Ok(hold)
}

fn log_status(snapshot: &ThermostatSnapshot) {
    info!(
        "{}: mode={} temp={} heat={} cool={} running={}",
        snapshot.name,
        snapshot.mode.as_str(),
        snapshot.current_temp_f,
        snapshot.heat_setpoint_f,
        snapshot.cool_setpoint_f,
        snapshot.is_equipment_running()
    );
}

async fn publish(db: &DbSection, metrics: &[Metric], poll_time: PollTime) -> PublishStatus {
    let result = match InfluxPublisher::new(db) {
        Ok(publisher) => publisher.publish(metrics, poll_time).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(_) => PublishStatus::Published,
        Err(err) => {
            warn!("failed to publish metrics: {err}");
            PublishStatus::Failed
        }
    }
}
