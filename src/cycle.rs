use {
    crate::{
        error::{Fault, ReadError},
        registry::SensorRegistry,
        sensors::SensorDescriptor,
    },
    std::time::Instant,
};

/// One successful channel read.
#[derive(Debug)]
pub struct Reading<'a> {
    pub descriptor: &'a SensorDescriptor,
    pub raw: f64,
    pub engineering: f64,
    pub voltage: Option<f64>,
    /// Milliseconds since the owning [`AcquisitionCycle`] was created.
    pub timestamp_ms: u64,
}

pub type Slot<'a> = Result<Reading<'a>, ReadError<'a>>;

/// Outcome of one pass over a registry: one slot per descriptor, in registry order.
#[derive(Debug, Default)]
pub struct CycleResult<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> CycleResult<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot<'a>> {
        self.slots.iter()
    }

    pub fn errors(&self) -> usize {
        self.slots.iter().filter(|s| s.is_err()).count()
    }
}

impl<'a> FromIterator<Slot<'a>> for CycleResult<'a> {
    fn from_iter<I: IntoIterator<Item = Slot<'a>>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

impl<'r, 'a> IntoIterator for &'r CycleResult<'a> {
    type Item = &'r Slot<'a>;
    type IntoIter = std::slice::Iter<'r, Slot<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

/// Drives single passes over a [`SensorRegistry`].
///
/// Performs no logging and no formatting; a failing sensor only fills its own slot.
#[derive(Debug, Clone)]
pub struct AcquisitionCycle {
    epoch: Instant,
}

impl Default for AcquisitionCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionCycle {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn run_once<'a>(&self, registry: &'a mut SensorRegistry) -> CycleResult<'a> {
        let raw: Vec<(Result<f64, Fault>, u64)> = registry
            .iter_mut()
            .map(|sensor| {
                let result = sensor.read();
                (result, self.elapsed_ms())
            })
            .collect();

        let registry: &'a SensorRegistry = registry;
        registry
            .iter()
            .zip(raw)
            .map(|(descriptor, (result, timestamp_ms))| {
                convert(descriptor, result, timestamp_ms).map_err(|fault| ReadError {
                    descriptor,
                    fault,
                    timestamp_ms,
                })
            })
            .collect()
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

fn convert(
    descriptor: &SensorDescriptor,
    result: Result<f64, Fault>,
    timestamp_ms: u64,
) -> Result<Reading<'_>, Fault> {
    let raw = result?;
    let engineering = descriptor.to_engineering(raw)?;
    Ok(Reading {
        descriptor,
        raw,
        engineering,
        voltage: descriptor.to_voltage(engineering),
        timestamp_ms,
    })
}
