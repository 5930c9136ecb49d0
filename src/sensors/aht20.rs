use {
    crate::{
        error::{Fault, SetupError},
        sensors::{ChannelGroup, Sensor, SensorDescriptor, VoltageMap},
    },
    aht20::Aht20,
    linux_embedded_hal::{Delay, I2cdev},
    log::debug,
};

pub const HUMIDITY: usize = 0;
pub const TEMPERATURE: usize = 1;

impl Sensor for Aht20<I2cdev, Delay> {
    fn measure(&mut self) -> Result<Vec<f64>, Fault> {
        let (h, t) = self.read().map_err(|e| {
            debug!("Failed to read from AHT20: {:?}", e);
            Fault::bus()
        })?;

        let mut sample = vec![0.0; 2];
        sample[HUMIDITY] = f64::from(h.rh());
        sample[TEMPERATURE] = f64::from(t.celsius());
        Ok(sample)
    }
}

pub fn initialize(i2c_dev: &str) -> Result<Aht20<I2cdev, Delay>, SetupError> {
    let dev = I2cdev::new(i2c_dev).map_err(|e| SetupError::Init {
        sensor: "AHT20",
        detail: format!("{}: {:?}", i2c_dev, e),
    })?;

    Aht20::new(dev, Delay).map_err(|e| SetupError::Init {
        sensor: "AHT20",
        detail: format!("{:?}", e),
    })
}

/// Humidity and temperature channels sharing one transaction per cycle.
pub fn descriptors<S: Sensor + 'static>(sensor: S) -> [SensorDescriptor; 2] {
    let group = ChannelGroup::new(sensor);
    [
        SensorDescriptor::new("humidity", "%", group.channel(HUMIDITY))
            .with_group("AHT20")
            .with_valid_range(0.0..=100.0)
            .with_voltage(VoltageMap::span_3v3(0.0, 100.0)),
        SensorDescriptor::new("temperature", "°C", group.channel(TEMPERATURE))
            .with_group("AHT20")
            .with_valid_range(-40.0..=85.0)
            .with_voltage(VoltageMap::span_3v3(-40.0, 85.0)),
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

    struct Bench(Vec<Result<(f64, f64), Fault>>);

    impl Sensor for Bench {
        fn measure(&mut self) -> Result<Vec<f64>, Fault> {
            let (h, t) = self.0.remove(0)?;
            Ok(vec![h, t])
        }
    }

    #[test]
    fn both_channels_come_from_one_sample() {
        let mut registry = SensorRegistry::new();
        for d in descriptors(Bench(vec![Ok((40.0, 21.5)), Ok((41.0, 21.0))])) {
            registry.register(d).unwrap();
        }
        let cycle = AcquisitionCycle::new();

        let lines = TextReporter::new().report(&cycle.run_once(&mut registry));
        assert_eq!(lines[0], "humidity: 40.00 % (1.32 V)");
        assert!(lines[1].starts_with("temperature: 21.50 °C"));

        let lines = TextReporter::new().report(&cycle.run_once(&mut registry));
        assert!(lines[0].starts_with("humidity: 41.00 %"));
    }

    #[test]
    fn implausible_humidity_is_out_of_range() {
        let mut registry = SensorRegistry::new();
        for d in descriptors(Bench(vec![Ok((120.0, 20.0))])) {
            registry.register(d).unwrap();
        }
        let result = AcquisitionCycle::new().run_once(&mut registry);
        let slots: Vec<_> = result.iter().collect();
        assert_eq!(slots[0].as_ref().unwrap_err().kind(), ErrorKind::OutOfRange);
        assert_eq!(slots[1].as_ref().unwrap().engineering, 20.0);
    }
}
