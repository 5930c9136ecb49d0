//! Resistive gas sensors (TGS26xx, MQ-x) behind a Linux IIO ADC.

use {
    crate::{
        error::{ErrorKind, Fault},
        sensors::{Conversion, SensorDescriptor},
    },
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

pub const DEFAULT_ADC_DIR: &str = "/sys/bus/iio/devices/iio:device0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogChannel {
    pub name: &'static str,
    pub index: u8,
}

const fn ch(name: &'static str, index: u8) -> AnalogChannel {
    AnalogChannel { name, index }
}

pub const BOARD1: [AnalogChannel; 4] = [
    ch("TGS2600", 0),
    ch("TGS2602", 1),
    ch("TGS2603", 2),
    ch("MQ2", 3),
];

pub const BOARD2: [AnalogChannel; 4] = [
    ch("TGS2610", 0),
    ch("TGS2611", 1),
    ch("TGS2612", 2),
    ch("MQ9_b", 3),
];

#[derive(Debug, Clone)]
pub struct IioAdc {
    dir: PathBuf,
    conversion: Conversion,
}

impl IioAdc {
    pub fn new(dir: impl Into<PathBuf>, conversion: Conversion) -> Self {
        Self {
            dir: dir.into(),
            conversion,
        }
    }

    pub fn channel_path(&self, index: u8) -> PathBuf {
        self.dir.join(format!("in_voltage{}_raw", index))
    }

    /// Read function returning raw ADC counts.
    pub fn channel(&self, index: u8) -> impl FnMut() -> Result<f64, Fault> + 'static {
        let path = self.channel_path(index);
        move || read_counts(&path)
    }

    pub fn descriptor(&self, channel: &AnalogChannel) -> SensorDescriptor {
        SensorDescriptor::new(channel.name, "V", self.channel(channel.index))
            .with_conversion(self.conversion)
    }
}

fn read_counts(path: &Path) -> Result<f64, Fault> {
    let text = fs::read_to_string(path)?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| Fault::with_diagnostic(ErrorKind::BusFault, text.into_bytes()))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{cycle::AcquisitionCycle, registry::SensorRegistry},
    };

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("airq-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const RIG_ADC: Conversion = Conversion::Adc {
        reference_volts: 5.0,
        full_scale: 1024.0,
    };

    #[test]
    fn reads_and_converts_counts() {
        let dir = scratch_dir("adc-ok");
        fs::write(dir.join("in_voltage0_raw"), "256\n").unwrap();

        let adc = IioAdc::new(&dir, RIG_ADC);
        let mut registry = SensorRegistry::new();
        registry.register(adc.descriptor(&BOARD1[0])).unwrap();

        let result = AcquisitionCycle::new().run_once(&mut registry);
        let reading = result.iter().next().unwrap().as_ref().unwrap();
        assert_eq!(reading.descriptor.name(), "TGS2600");
        assert_eq!(reading.raw, 256.0);
        assert!((reading.engineering - 1.25).abs() < 1e-9);
    }

    #[test]
    fn missing_channel_is_a_bus_fault() {
        let dir = scratch_dir("adc-missing");
        let mut read = IioAdc::new(&dir, RIG_ADC).channel(7);
        assert_eq!(read().unwrap_err().kind, ErrorKind::BusFault);
    }

    #[test]
    fn garbage_content_carries_diagnostic() {
        let dir = scratch_dir("adc-garbage");
        fs::write(dir.join("in_voltage1_raw"), "n/a").unwrap();
        let mut read = IioAdc::new(&dir, RIG_ADC).channel(1);
        let err = read().unwrap_err();
        assert_eq!(err.kind, ErrorKind::BusFault);
        assert_eq!(err.diagnostic, b"n/a".to_vec());
    }

    #[test]
    fn presets_have_unique_names_and_channels() {
        for preset in [BOARD1, BOARD2] {
            for (i, a) in preset.iter().enumerate() {
                for b in &preset[i + 1..] {
                    assert_ne!(a.name, b.name);
                    assert_ne!(a.index, b.index);
                }
            }
        }
    }
}
