use {
    crate::{error::RegistryError, sensors::SensorDescriptor},
    log::debug,
};

/// Build-once, read-many set of sensor channels.
///
/// Insertion order is the reporting order. Names are unique; there is no removal.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: Vec<SensorDescriptor>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `descriptor`, leaving the registry untouched if its name is taken.
    pub fn register(&mut self, descriptor: SensorDescriptor) -> Result<(), RegistryError> {
        if self.contains(descriptor.name()) {
            return Err(RegistryError::DuplicateName(descriptor.name().to_string()));
        }
        debug!(
            "Registered {} [{}] at position {}",
            descriptor.name(),
            descriptor.unit(),
            self.sensors.len()
        );
        self.sensors.push(descriptor);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sensors.iter().any(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Descriptors in insertion order. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = &SensorDescriptor> + '_ {
        self.sensors.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut SensorDescriptor> + '_ {
        self.sensors.iter_mut()
    }
}

impl<'a> IntoIterator for &'a SensorRegistry {
    type Item = &'a SensorDescriptor;
    type IntoIter = std::slice::Iter<'a, SensorDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.sensors.iter()
    }
}
