use {
    crate::{
        error::{Fault, SetupError},
        sensors::{ChannelGroup, Conversion, Sensor, SensorDescriptor, VoltageMap},
    },
    bme680::{Bme680, I2CAddress, IIRFilterSize, OversamplingSetting, PowerMode, SettingsBuilder},
    linux_embedded_hal::{Delay, I2cdev},
    log::debug,
    std::time::Duration,
};

pub const TEMPERATURE: usize = 0;
/// Pascal.
pub const PRESSURE: usize = 1;
pub const HUMIDITY: usize = 2;
/// Ohm.
pub const GAS: usize = 3;

const HEATER_TEMPERATURE_C: u16 = 320;
const HEATER_DURATION: Duration = Duration::from_millis(150);
const AMBIENT_TEMPERATURE_C: i8 = 25;

/// Forced-mode BME680/688 on the primary address (0x76).
pub struct Bme {
    dev: Bme680<I2cdev, Delay>,
    delay: Delay,
}

impl Sensor for Bme {
    fn measure(&mut self) -> Result<Vec<f64>, Fault> {
        self.dev
            .set_sensor_mode(&mut self.delay, PowerMode::ForcedMode)
            .map_err(fault)?;
        let (data, _condition) = self.dev.get_sensor_data(&mut self.delay).map_err(fault)?;

        let mut sample = vec![0.0; 4];
        sample[TEMPERATURE] = f64::from(data.temperature_celsius());
        sample[PRESSURE] = f64::from(data.pressure_hpa()) * 100.0;
        sample[HUMIDITY] = f64::from(data.humidity_percent());
        sample[GAS] = f64::from(data.gas_resistance_ohm());
        Ok(sample)
    }
}

fn fault<E: std::fmt::Debug>(e: E) -> Fault {
    debug!("Failed to read from BME680: {:?}", e);
    Fault::bus()
}

pub fn initialize(i2c_dev: &str) -> Result<Bme, SetupError> {
    let init = |detail: String| SetupError::Init {
        sensor: "BME680",
        detail,
    };

    let i2c = I2cdev::new(i2c_dev).map_err(|e| init(format!("{}: {:?}", i2c_dev, e)))?;
    let mut delay = Delay;
    let mut dev = Bme680::init(i2c, &mut delay, I2CAddress::Primary)
        .map_err(|e| init(format!("{:?}", e)))?;

    let settings = SettingsBuilder::new()
        .with_humidity_oversampling(OversamplingSetting::OS2x)
        .with_pressure_oversampling(OversamplingSetting::OS4x)
        .with_temperature_oversampling(OversamplingSetting::OS8x)
        .with_temperature_filter(IIRFilterSize::Size3)
        .with_gas_measurement(HEATER_DURATION, HEATER_TEMPERATURE_C, AMBIENT_TEMPERATURE_C)
        .with_run_gas(true)
        .build();
    dev.set_sensor_settings(&mut delay, settings)
        .map_err(|e| init(format!("{:?}", e)))?;

    Ok(Bme { dev, delay })
}

/// Temperature, pressure, humidity and gas resistance from one forced measurement per cycle.
///
/// Pressure is printed in KPa and gas resistance in Kohms, the units the rig's capture
/// tooling keys its columns on.
pub fn descriptors<S: Sensor + 'static>(sensor: S) -> [SensorDescriptor; 4] {
    let group = ChannelGroup::new(sensor);
    let kilo = Conversion::Linear {
        scale: 0.001,
        offset: 0.0,
    };
    [
        SensorDescriptor::new("BME680 temperature", "°C", group.channel(TEMPERATURE))
            .with_group("BME688")
            .with_valid_range(-40.0..=85.0)
            .with_voltage(VoltageMap::span_3v3(-40.0, 85.0)),
        SensorDescriptor::new("pressure", "KPa", group.channel(PRESSURE))
            .with_group("BME688")
            .with_conversion(kilo)
            .with_valid_range(30.0..=110.0)
            .with_voltage(VoltageMap::span_3v3(30.0, 110.0)),
        SensorDescriptor::new("BME680 humidity", "%", group.channel(HUMIDITY))
            .with_group("BME688")
            .with_valid_range(0.0..=100.0)
            .with_voltage(VoltageMap::span_3v3(0.0, 100.0)),
        SensorDescriptor::new("gas", "Kohms", group.channel(GAS))
            .with_group("BME688")
            .with_conversion(kilo),
    ]
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            cycle::AcquisitionCycle,
            error::ErrorKind,
            registry::SensorRegistry,
            report::{Reporter, TextReporter},
        },
    };

    struct Bench(Result<[f64; 4], Fault>);

    impl Sensor for Bench {
        fn measure(&mut self) -> Result<Vec<f64>, Fault> {
            self.0.clone().map(Vec::from)
        }
    }

    fn registry(sample: Result<[f64; 4], Fault>) -> SensorRegistry {
        let mut registry = SensorRegistry::new();
        for d in descriptors(Bench(sample)) {
            registry.register(d).unwrap();
        }
        registry
    }

    #[test]
    fn pressure_and_gas_are_scaled_to_kilo_units() {
        let mut registry = registry(Ok([22.5, 100800.0, 40.0, 52300.0]));
        let lines = TextReporter::new().report(&AcquisitionCycle::new().run_once(&mut registry));
        assert_eq!(
            lines,
            [
                "BME680 temperature: 22.50 °C (1.65 V)",
                "pressure: 100.80 KPa (2.92 V)",
                "BME680 humidity: 40.00 % (1.32 V)",
                "gas: 52.30 Kohms",
            ]
        );
    }

    #[test]
    fn failed_measurement_fails_every_channel() {
        let mut registry = registry(Err(Fault::bus()));
        let result = AcquisitionCycle::new().run_once(&mut registry);
        assert_eq!(result.errors(), 4);
        for slot in &result {
            assert_eq!(slot.as_ref().unwrap_err().kind(), ErrorKind::BusFault);
        }
    }
}
