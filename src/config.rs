use {
    crate::sensors::analog::{AnalogChannel, BOARD1, BOARD2},
    anyhow::{anyhow, bail, Context, Result},
    std::{env, path::PathBuf, str::FromStr, time::Duration},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Analog,
    Aht20,
    Sgp30,
    Bme680,
    Sfa3x,
    Co2,
}

impl FromStr for SensorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analog" => Ok(SensorKind::Analog),
            "aht20" => Ok(SensorKind::Aht20),
            "sgp30" => Ok(SensorKind::Sgp30),
            "bme680" | "bme688" => Ok(SensorKind::Bme680),
            "sfa3x" | "sfa30" | "hcho" => Ok(SensorKind::Sfa3x),
            "co2" | "ndir" => Ok(SensorKind::Co2),
            other => Err(anyhow!("unknown sensor '{}'", other)),
        }
    }
}

/// Analog channel layout of a hardware variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    Board1,
    Board2,
}

impl Board {
    pub fn analog_channels(&self) -> &'static [AnalogChannel] {
        match self {
            Board::Board1 => &BOARD1,
            Board::Board2 => &BOARD2,
        }
    }
}

impl FromStr for Board {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "board1" | "1" => Ok(Board::Board1),
            "board2" | "2" => Ok(Board::Board2),
            other => Err(anyhow!("unknown board '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Csv,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "csv" => Ok(Format::Csv),
            other => Err(anyhow!("unknown format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub device_id: String,
    pub interval: Duration,
    /// Enabled sensors, in reporting order.
    pub sensors: Vec<SensorKind>,
    pub board: Board,
    pub format: Format,
    pub cycle_marker: Option<String>,
    /// Precede each device's channels with a `Reading <device>...` line in text output.
    pub group_headers: bool,
    pub i2c_dev: String,
    pub adc_dir: PathBuf,
    pub adc_reference_volts: f64,
    pub adc_full_scale: f64,
    pub co2_serial: PathBuf,
    pub co2_window: Duration,
    pub sgp30_conditioning: u32,
    pub setup_retries: u32,
    pub log_file: Option<PathBuf>,
    pub mqtt: Option<(String, u16)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let interval_ms: u64 = parse(&lookup, "AIRQ_INTERVAL_MS", 1000)?;
        if interval_ms == 0 {
            bail!("AIRQ_INTERVAL_MS must be greater than zero");
        }

        let sensors = parse_sensors(&get("AIRQ_SENSORS", "analog,aht20,sgp30,co2"))
            .context("invalid AIRQ_SENSORS")?;

        let mqtt = match lookup("MQTT_ADDR") {
            Some(addr) => Some((addr, parse(&lookup, "MQTT_PORT", 1883)?)),
            None => None,
        };

        let adc_full_scale: f64 = parse(&lookup, "ADC_FULL_SCALE", 1024.0)?;
        if adc_full_scale <= 0.0 {
            bail!("ADC_FULL_SCALE must be positive");
        }

        Ok(Self {
            device_id: get("BALENA_DEVICE_UUID", "airq"),
            interval: Duration::from_millis(interval_ms),
            sensors,
            board: get("AIRQ_BOARD", "board1")
                .parse()
                .context("invalid AIRQ_BOARD")?,
            format: get("AIRQ_FORMAT", "text")
                .parse()
                .context("invalid AIRQ_FORMAT")?,
            cycle_marker: lookup("AIRQ_CYCLE_MARKER"),
            group_headers: parse(&lookup, "AIRQ_GROUP_HEADERS", false)?,
            i2c_dev: get("I2C_DEV", "/dev/i2c-1"),
            adc_dir: get("ADC_DEVICE", crate::sensors::analog::DEFAULT_ADC_DIR).into(),
            adc_reference_volts: parse(&lookup, "ADC_REFERENCE_V", 5.0)?,
            adc_full_scale,
            co2_serial: get("CO2_SERIAL", "/dev/ttyS0").into(),
            co2_window: Duration::from_millis(parse(&lookup, "CO2_TIMEOUT_MS", 300)?),
            sgp30_conditioning: parse(&lookup, "SGP30_CONDITIONING", 15)?,
            setup_retries: parse(&lookup, "AIRQ_SETUP_RETRIES", 3)?,
            log_file: lookup("AIRQ_LOG_FILE").map(PathBuf::from),
            mqtt,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_sensors(list: &str) -> Result<Vec<SensorKind>> {
    let mut sensors = Vec::new();
    for item in list.split(',').filter(|s| !s.trim().is_empty()) {
        let kind: SensorKind = item.parse()?;
        if sensors.contains(&kind) {
            bail!("sensor '{}' listed twice", item.trim());
        }
        sensors.push(kind);
    }
    Ok(sensors)
}
