//! SFA3x formaldehyde sensor.
//!
//! The module measures continuously once started; every read fetches the latest HCHO, humidity
//! and temperature words, each followed by a Sensirion CRC-8.

use {
    crate::{
        error::{ErrorKind, Fault, SetupError},
        sensors::{ChannelGroup, Conversion, Sensor, SensorDescriptor, VoltageMap},
    },
    embedded_hal::blocking::{delay::DelayMs, i2c},
    linux_embedded_hal::{Delay, I2cdev},
    log::debug,
    sensirion_i2c::i2c as sensirion,
    std::fmt::Debug,
};

pub const ADDRESS: u8 = 0x5D;

const START_CONTINUOUS_MEASUREMENT: u16 = 0x0006;
const READ_MEASURED_VALUES: u16 = 0x0327;
const COMMAND_DELAY_MS: u8 = 5;

pub const HCHO: usize = 0;
pub const HUMIDITY: usize = 1;
pub const TEMPERATURE: usize = 2;

pub struct Sfa3x<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C, D, E> Sfa3x<I2C, D>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
    E: Debug,
    D: DelayMs<u8>,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }

    pub fn start(&mut self) -> Result<(), Fault> {
        self.command(START_CONTINUOUS_MEASUREMENT)
    }

    /// Raw signed words: HCHO (ppb * 5), humidity (% * 100), temperature (°C * 200).
    pub fn read_raw(&mut self) -> Result<[i16; 3], Fault> {
        self.command(READ_MEASURED_VALUES)?;

        let mut buf = [0; 9];
        sensirion::read_words_with_crc(&mut self.i2c, ADDRESS, &mut buf).map_err(|e| match e {
            sensirion::Error::Crc => Fault::with_diagnostic(ErrorKind::ChecksumFailure, &buf[..]),
            sensirion::Error::I2cRead(e) | sensirion::Error::I2cWrite(e) => {
                debug!("SFA3x read failed: {:?}", e);
                Fault::bus()
            }
        })?;

        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[3], buf[4]]),
            i16::from_be_bytes([buf[6], buf[7]]),
        ])
    }

    fn command(&mut self, command: u16) -> Result<(), Fault> {
        sensirion::write_command_u16(&mut self.i2c, ADDRESS, command).map_err(|e| {
            debug!("SFA3x command {:#06x} failed: {:?}", command, e);
            Fault::bus()
        })?;
        self.delay.delay_ms(COMMAND_DELAY_MS);
        Ok(())
    }
}

impl<I2C, D, E> Sensor for Sfa3x<I2C, D>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
    E: Debug,
    D: DelayMs<u8>,
{
    fn measure(&mut self) -> Result<Vec<f64>, Fault> {
        Ok(self.read_raw()?.iter().map(|&w| f64::from(w)).collect())
    }
}

pub fn initialize(i2c_dev: &str) -> Result<Sfa3x<I2cdev, Delay>, SetupError> {
    let dev = I2cdev::new(i2c_dev).map_err(|e| SetupError::Init {
        sensor: "SFA3x",
        detail: format!("{}: {:?}", i2c_dev, e),
    })?;

    let mut sfa = Sfa3x::new(dev, Delay);
    sfa.start().map_err(|e| SetupError::Init {
        sensor: "SFA3x",
        detail: format!("start measurement: {}", e),
    })?;
    Ok(sfa)
}

pub fn descriptors<S: Sensor + 'static>(sensor: S) -> [SensorDescriptor; 3] {
    let group = ChannelGroup::new(sensor);
    let scaled = |scale: f64| Conversion::Linear { scale, offset: 0.0 };
    [
        SensorDescriptor::new("hcho", "ppb", group.channel(HCHO))
            .with_group("Formaldehyde")
            .with_conversion(scaled(1.0 / 5.0))
            .with_voltage(VoltageMap::span_3v3(0.0, 10000.0)),
        SensorDescriptor::new("SFA3x humidity", "%", group.channel(HUMIDITY))
            .with_group("Formaldehyde")
            .with_conversion(scaled(1.0 / 100.0))
            .with_valid_range(0.0..=100.0)
            .with_voltage(VoltageMap::span_3v3(0.0, 100.0)),
        SensorDescriptor::new("SFA3x temperature", "°C", group.channel(TEMPERATURE))
            .with_group("Formaldehyde")
            .with_conversion(scaled(1.0 / 200.0))
            .with_voltage(VoltageMap::span_3v3(-20.0, 50.0)),
    ]
}
