use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use ferment_core::hal_sim::{Element, Location, SimulatedChamber};
use ferment_core::{
    tags, Actuator, ActuatorError, ActuatorHeartbeat, Aggregator, ConfigSnapshot, ConfigSource,
    Controller, Interlock, Plant, RelayActuator, Schedule, Scheduler, Sensor, SetupError,
};
use ferment_io::{ConfigError, ConfigFile, ControlMetrics, MetricsSink, SnapshotLog, SnapshotPublisher};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

const DEFAULT_WINDOW_SIZE: f64 = 10.0;

/// Per-task interval and initial delay in seconds.
const SENSOR_TIMING: (f64, f64) = (1.0, 0.0);
const CONTROLLER_TIMING: (f64, f64) = (5.0, 5.0);
const CONFIG_TIMING: (f64, f64) = (5.0, 5.0);
const HEARTBEAT_TIMING: (f64, f64) = (1.0, 0.0);
const PUBLISH_TIMING: (f64, f64) = (10.0, 10.0);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    #[error("failed to open snapshot log {path}: {source}")]
    SnapshotLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub async fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    // Held until exit so buffered file logs are flushed
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fermentd failed to start");
            ExitCode::FAILURE
        }
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), StartupError> {
    // Initialize metrics
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let config_file = open_config(&config)?;
    let settings = config_file.shared();

    let chamber = SimulatedChamber::new();
    let aggregator = Arc::new(Aggregator::for_components(
        &tags::CHAMBER_TEMPERATURES,
        &tags::CHAMBER_ACTUATORS,
    ));

    let window = settings.get_or("window_size", DEFAULT_WINDOW_SIZE).max(0.0) as usize;
    let room = Sensor::new(tags::ROOM, chamber.thermometer(Location::Room), window)?
        .with_observer(aggregator.clone());
    let vessel = Sensor::new(tags::VESSEL, chamber.thermometer(Location::Vessel), window)?
        .with_observer(aggregator.clone());
    let fridge = Sensor::new(tags::FRIDGE, chamber.thermometer(Location::Fridge), window)?
        .with_observer(aggregator.clone());

    let heater = Arc::new(
        RelayActuator::new(tags::HEATER, chamber.relay(Element::Heater))
            .with_observer(aggregator.clone()),
    );
    let cooler = Arc::new(
        RelayActuator::new(tags::COOLER, chamber.relay(Element::Cooler))
            .with_observer(aggregator.clone()),
    );
    heater.open()?;
    cooler.open()?;

    let limiter = Arc::new(
        Interlock::new(tags::LIMITER, heater.clone() as Arc<dyn Actuator>)
            .with_observer(aggregator.clone()),
    );
    limiter.open();

    let controller_schedule = schedule(&settings, "controller", CONTROLLER_TIMING)?;
    let plant = Plant {
        primary: Arc::new(vessel.handle()),
        secondary: Arc::new(fridge.handle()),
        heater: Arc::new(limiter.guarded()),
        cooler: cooler.clone() as Arc<dyn Actuator>,
        interlock: limiter.clone() as Arc<dyn Actuator>,
    };
    let controller = Controller::new(
        Arc::new(settings.clone()),
        plant,
        controller_schedule.interval,
    )
    .with_observer(aggregator.clone())
    .with_observer(Arc::new(ControlMetrics))
    .with_setpoint_observer(aggregator.clone());

    let heartbeat = ActuatorHeartbeat::new(vec![
        heater.clone() as Arc<dyn Actuator>,
        cooler.clone() as Arc<dyn Actuator>,
        limiter.clone() as Arc<dyn Actuator>,
    ]);

    let mut publisher = SnapshotPublisher::new(aggregator.clone()).with_sink(MetricsSink);
    if let Some(path) = &config.snapshot_log {
        let log = SnapshotLog::new(path).map_err(|source| StartupError::SnapshotLog {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Snapshot log enabled");
        publisher = publisher.with_sink(log);
    }

    let sensor_schedule = schedule(&settings, "sensor", SENSOR_TIMING)?;
    let config_schedule = schedule(&settings, "config", CONFIG_TIMING)?;
    let heartbeat_schedule = schedule(&settings, "heartbeat", HEARTBEAT_TIMING)?;
    let publish_schedule = schedule(&settings, "publish", PUBLISH_TIMING)?;

    let mut scheduler = Scheduler::new();
    scheduler.start(room, sensor_schedule);
    scheduler.start(vessel, sensor_schedule);
    scheduler.start(fridge, sensor_schedule);
    scheduler.start(heartbeat, heartbeat_schedule);
    scheduler.start(controller, controller_schedule);
    scheduler.start(config_file, config_schedule);
    scheduler.start(publisher, publish_schedule);

    info!(
        tasks = scheduler.len(),
        config = %config.config_path.display(),
        "fermentd running"
    );

    wait_for_stop(config.run_seconds).await;

    for report in scheduler.shutdown().await {
        info!(
            task = %report.name,
            ticks = report.ticks,
            max_tick_ms = report.max_tick.as_millis() as u64,
            shut_down = report.shut_down,
            "Task stopped"
        );
    }

    // Leave the chamber unpowered
    let outputs: [&dyn Actuator; 2] = [&*heater, &*cooler];
    for actuator in outputs {
        if let Err(e) = actuator.set(false) {
            error!(actuator = actuator.name(), error = %e, "Failed to switch off on exit");
        }
    }

    info!("fermentd stopped");
    Ok(())
}

fn open_config(config: &RuntimeConfig) -> Result<ConfigFile, ConfigError> {
    match ConfigFile::open(&config.config_path) {
        Ok(file) => Ok(file),
        Err(e) if e.is_missing_file() => {
            warn!(
                path = %config.config_path.display(),
                "Config file not found, running on defaults"
            );
            Ok(ConfigFile::with_fallback(
                &config.config_path,
                ConfigSnapshot::new(),
            ))
        }
        Err(e) => Err(e),
    }
}

fn schedule(
    settings: &dyn ConfigSource,
    task: &str,
    (interval, init_delay): (f64, f64),
) -> Result<Schedule, SetupError> {
    Schedule::from_secs(
        settings.get_or(&format!("{task}_interval"), interval),
        settings.get_or(&format!("{task}_init_delay"), init_delay),
    )
}

async fn wait_for_stop(run_seconds: Option<u64>) {
    let deadline = async {
        match run_seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = deadline => info!("Run time elapsed"),
        _ = interrupted() => info!("Interrupted"),
        _ = terminated() => info!("Terminated"),
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}
