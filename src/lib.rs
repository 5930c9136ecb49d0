//! Air-quality sensor polling and reporting.
//!
//! A [`SensorRegistry`] of channels is read once per cycle by an [`AcquisitionCycle`], the
//! result is formatted by a [`Reporter`] and written to a [`Sink`]. The
//! [`PeriodicScheduler`] repeats this at a fixed interval, or earlier when an asynchronously
//! completing sensor signals that fresh data is ready.

use {
    anyhow::{Context, Result},
    log::{info, warn},
    tokio::{signal, task},
};

pub mod board;
pub mod config;
pub mod cycle;
pub mod error;
pub mod fusion;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod sensors;
pub mod sink;

pub use {
    config::Config,
    cycle::{AcquisitionCycle, CycleResult, Reading},
    error::{ErrorKind, Fault, ReadError, RegistryError, SetupError},
    registry::SensorRegistry,
    report::{CsvReporter, Reporter, TextReporter},
    scheduler::{PeriodicScheduler, ReadyHandle, SchedulerState, ShutdownHandle},
    sensors::SensorDescriptor,
    sink::Sink,
};

use {
    config::Format,
    sink::{ConsoleSink, Fanout, FileSink, MqttSink},
};

/// Host entry point: configure from the environment, set the board up and poll until Ctrl-C.
pub async fn run() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Device {} polling {:?} every {:?}",
        config.device_id, config.sensors, config.interval
    );

    let mut scheduler = PeriodicScheduler::new(config.interval);
    let mut registry = board::setup(&config, scheduler.ready_handle())
        .await
        .context("Sensor setup failed")?;

    let reporter: Box<dyn Reporter> = match config.format {
        Format::Text => {
            let text = match &config.cycle_marker {
                Some(marker) => TextReporter::with_marker(marker.clone()),
                None => TextReporter::new(),
            };
            if config.group_headers {
                Box::new(text.with_group_headers())
            } else {
                Box::new(text)
            }
        }
        Format::Csv => Box::new(CsvReporter),
    };

    let mut sink = Fanout::new();
    sink.push(ConsoleSink);
    if let Some(path) = &config.log_file {
        let file = FileSink::open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        info!("Appending readings to {}", path.display());
        sink.push(file);
    }
    if let Some((host, port)) = &config.mqtt {
        info!("MQTT connecting to {}:{}", host, port);
        let (mqtt, eventloop) = MqttSink::connect(&config.device_id, host, *port);
        task::spawn(MqttSink::drive(eventloop));
        sink.push(mqtt);
    }

    let shutdown = scheduler.shutdown_handle();
    let ready = scheduler.ready_handle();
    task::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Interrupted, finishing current cycle");
        shutdown.trigger();
        ready.notify();
    });

    scheduler
        .run(&mut registry, reporter.as_ref(), &mut sink)
        .await;

    Ok(())
}
