//! Sensor channel descriptions and the adapters that feed them.
//!
//! A [`SensorDescriptor`] is one printed channel: a name, a unit, a fallible read and the
//! conversions applied to whatever the read returns. Devices that return several channels
//! from one bus transaction are wrapped in a [`ChannelGroup`].

use {
    crate::error::{ErrorKind, Fault},
    std::{cell::RefCell, fmt, ops::RangeInclusive, rc::Rc},
};

pub mod aht20;
pub mod analog;
pub mod bme680;
pub mod ndir;
pub mod sfa3x;
pub mod sgp30;

/// A device that returns all of its channels in a single transaction.
pub trait Sensor {
    fn measure(&mut self) -> Result<Vec<f64>, Fault>;
}

pub type ReadFn = Box<dyn FnMut() -> Result<f64, Fault>>;

/// Raw value to engineering value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Identity,
    Linear { scale: f64, offset: f64 },
    /// ADC counts to volts: `raw / full_scale * reference_volts`.
    Adc { reference_volts: f64, full_scale: f64 },
}

impl Conversion {
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            Conversion::Identity => raw,
            Conversion::Linear { scale, offset } => raw * scale + offset,
            Conversion::Adc {
                reference_volts,
                full_scale,
            } => raw / full_scale * reference_volts,
        }
    }
}

impl Default for Conversion {
    fn default() -> Self {
        Conversion::Identity
    }
}

/// Linear rescale of an engineering value into an equivalent analog voltage.
///
/// Not clamped: values outside `in_min..=in_max` extrapolate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageMap {
    pub in_min: f64,
    pub in_max: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl VoltageMap {
    pub const fn new(in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> Self {
        Self {
            in_min,
            in_max,
            out_min,
            out_max,
        }
    }

    /// Maps `in_min..=in_max` onto a 0 to 3.3 V span.
    pub const fn span_3v3(in_min: f64, in_max: f64) -> Self {
        Self::new(in_min, in_max, 0.0, 3.3)
    }

    pub fn apply(&self, value: f64) -> f64 {
        let span = self.in_max - self.in_min;
        if span == 0.0 {
            return self.out_min;
        }
        self.out_min + (value - self.in_min) * (self.out_max - self.out_min) / span
    }
}

pub struct SensorDescriptor {
    name: String,
    unit: String,
    group: Option<String>,
    read: ReadFn,
    conversion: Conversion,
    voltage: Option<VoltageMap>,
    valid_range: Option<RangeInclusive<f64>>,
    precision: usize,
}

impl SensorDescriptor {
    pub fn new<F>(name: impl Into<String>, unit: impl Into<String>, read: F) -> Self
    where
        F: FnMut() -> Result<f64, Fault> + 'static,
    {
        Self {
            name: name.into(),
            unit: unit.into(),
            group: None,
            read: Box::new(read),
            conversion: Conversion::Identity,
            voltage: None,
            valid_range: None,
            precision: 2,
        }
    }

    /// Device the channel belongs to, for reporters that print per-device headers.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn with_voltage(mut self, map: VoltageMap) -> Self {
        self.voltage = Some(map);
        self
    }

    /// Engineering values outside `range` are reported as [`ErrorKind::OutOfRange`].
    pub fn with_valid_range(mut self, range: RangeInclusive<f64>) -> Self {
        self.valid_range = Some(range);
        self
    }

    /// Decimal places used when the value is printed.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Performs the underlying driver read.
    pub fn read(&mut self) -> Result<f64, Fault> {
        (self.read)()
    }

    pub fn to_engineering(&self, raw: f64) -> Result<f64, Fault> {
        let value = self.conversion.apply(raw);
        match &self.valid_range {
            Some(range) if !range.contains(&value) => Err(Fault::with_diagnostic(
                ErrorKind::OutOfRange,
                value.to_string().into_bytes(),
            )),
            _ => Ok(value),
        }
    }

    pub fn to_voltage(&self, engineering: f64) -> Option<f64> {
        self.voltage.map(|map| map.apply(engineering))
    }
}

impl fmt::Debug for SensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorDescriptor")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("group", &self.group)
            .field("conversion", &self.conversion)
            .field("voltage", &self.voltage)
            .field("valid_range", &self.valid_range)
            .finish_non_exhaustive()
    }
}

/// Shares one multi-channel [`Sensor`] between several descriptors.
///
/// The first channel read in a cycle performs the transaction and latches the sample; every
/// other channel consumes its latched value once. Reading a channel whose value was already
/// consumed triggers a fresh transaction.
pub struct ChannelGroup<S> {
    latch: Rc<RefCell<Latch<S>>>,
}

struct Latch<S> {
    sensor: S,
    sample: Vec<Option<f64>>,
}

impl<S: Sensor> Latch<S> {
    fn take(&mut self, index: usize) -> Result<f64, Fault> {
        if let Some(value) = self.sample.get_mut(index).and_then(Option::take) {
            return Ok(value);
        }

        self.sample = self.sensor.measure()?.into_iter().map(Some).collect();
        self.sample
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(Fault::bus)
    }
}

impl<S: Sensor + 'static> ChannelGroup<S> {
    pub fn new(sensor: S) -> Self {
        Self {
            latch: Rc::new(RefCell::new(Latch {
                sensor,
                sample: Vec::new(),
            })),
        }
    }

    /// Read function for the channel at `index` of the sensor's sample.
    pub fn channel(&self, index: usize) -> impl FnMut() -> Result<f64, Fault> + 'static {
        let latch = Rc::clone(&self.latch);
        move || latch.borrow_mut().take(index)
    }
}
