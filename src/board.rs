//! Builds the sensor registry of one hardware variant.
//!
//! Every board runs the same polling core; only the set of descriptors differs.

use {
    crate::{
        config::{Config, SensorKind},
        error::SetupError,
        fusion,
        registry::SensorRegistry,
        scheduler::ReadyHandle,
        sensors::{
            aht20, analog::IioAdc, bme680, ndir::Ndir, sfa3x, sgp30, Conversion, SensorDescriptor,
        },
    },
    linux_embedded_hal::{
        serial_core::{self, SerialPort, SerialPortSettings},
        Delay, Serial,
    },
    log::{info, warn},
    std::{future::Future, time::Duration},
    tokio::{task, time},
};

const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Per-byte wait of the CO2 UART; the module's receive window bounds the whole frame.
const UART_TIMEOUT: Duration = Duration::from_millis(10);

/// Sets up every enabled sensor in configuration order.
pub async fn setup(config: &Config, ready: ReadyHandle) -> Result<SensorRegistry, SetupError> {
    let ready = &ready;
    assemble(&config.sensors, move |kind| init_sensor(config, ready, kind)).await
}

/// Registers the descriptors `init` produces for each kind.
///
/// Sensors that fail setup are skipped with a warning, except for fatal failures (a failed
/// mandatory self-test), which abort setup before any later sensor is touched.
pub(crate) async fn assemble<F, Fut>(
    sensors: &[SensorKind],
    mut init: F,
) -> Result<SensorRegistry, SetupError>
where
    F: FnMut(SensorKind) -> Fut,
    Fut: Future<Output = Result<Vec<SensorDescriptor>, SetupError>>,
{
    let mut registry = SensorRegistry::new();

    for &kind in sensors {
        match init(kind).await {
            Ok(descriptors) => {
                for descriptor in descriptors {
                    registry.register(descriptor)?;
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Skipping {:?}: {}", kind, e),
        }
    }

    info!("Initialization complete, {} channels", registry.len());
    Ok(registry)
}

async fn init_sensor(
    config: &Config,
    ready: &ReadyHandle,
    kind: SensorKind,
) -> Result<Vec<SensorDescriptor>, SetupError> {
    let attempts = config.setup_retries.max(1);
    let i2c_dev = config.i2c_dev.as_str();

    match kind {
        SensorKind::Analog => Ok(analog(config)),
        SensorKind::Aht20 => retry("AHT20", attempts, || async { aht20::initialize(i2c_dev) })
            .await
            .map(|sensor| Vec::from(aht20::descriptors(sensor))),
        SensorKind::Sgp30 => retry("SGP30", attempts, || async { sgp30::initialize(i2c_dev) })
            .await
            .map(|sensor| {
                let (publisher, subscriber) = fusion::channel(ready.clone());
                task::spawn(sgp30::run(
                    sensor,
                    publisher,
                    config.sgp30_conditioning,
                    sgp30::SAMPLE_PERIOD,
                ));
                info!("Started SGP30 task");
                Vec::from(sgp30::descriptors(&subscriber))
            }),
        SensorKind::Bme680 => retry("BME680", attempts, || async { bme680::initialize(i2c_dev) })
            .await
            .map(|sensor| Vec::from(bme680::descriptors(sensor))),
        SensorKind::Sfa3x => retry("SFA3x", attempts, || async { sfa3x::initialize(i2c_dev) })
            .await
            .map(|sensor| Vec::from(sfa3x::descriptors(sensor))),
        SensorKind::Co2 => retry("CO2", attempts, || async { co2(config) }).await,
    }
}

fn analog(config: &Config) -> Vec<SensorDescriptor> {
    if !config.adc_dir.exists() {
        warn!("ADC directory {} not found", config.adc_dir.display());
    }
    let adc = IioAdc::new(
        &config.adc_dir,
        Conversion::Adc {
            reference_volts: config.adc_reference_volts,
            full_scale: config.adc_full_scale,
        },
    );
    config
        .board
        .analog_channels()
        .iter()
        .map(|channel| adc.descriptor(channel))
        .collect()
}

/// 9600 baud, 8N1, no flow control.
fn configure_uart(settings: &mut dyn SerialPortSettings) -> serial_core::Result<()> {
    settings.set_baud_rate(serial_core::Baud9600)?;
    settings.set_char_size(serial_core::Bits8);
    settings.set_parity(serial_core::ParityNone);
    settings.set_stop_bits(serial_core::Stop1);
    settings.set_flow_control(serial_core::FlowNone);
    Ok(())
}

fn co2(config: &Config) -> Result<Vec<SensorDescriptor>, SetupError> {
    let init = |e: serial_core::Error| SetupError::Init {
        sensor: "CO2",
        detail: format!("{}: {}", config.co2_serial.display(), e),
    };

    let mut serial = Serial::open(&config.co2_serial).map_err(init)?;
    serial.0.reconfigure(&configure_uart).map_err(init)?;
    serial.0.set_timeout(UART_TIMEOUT).map_err(init)?;
    let mut ndir = Ndir::new(serial, Delay).with_window(config.co2_window);

    Ok(vec![SensorDescriptor::new("CO2", "ppm", move || {
        ndir.read_ppm().map(f64::from)
    })
    .with_group("CO2")
    .with_valid_range(0.0..=10000.0)
    .with_precision(0)])
}

/// Runs `init` up to `attempts` times, pausing between failures.
pub(crate) async fn retry<T, F, Fut>(
    sensor: &str,
    attempts: u32,
    mut init: F,
) -> Result<T, SetupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SetupError>>,
{
    let mut attempt = 1;
    loop {
        match init().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("{} setup attempt {}/{} failed: {}", sensor, attempt, attempts, e);
                time::sleep(RETRY_DELAY).await;
                attempt += 1;
            }
        }
    }
}
