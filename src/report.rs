//! Formatting of cycle results into text lines.
//!
//! Reporters are pure: the same [`CycleResult`] always yields the same lines, and where those
//! lines go is up to a [`Sink`](crate::sink::Sink).

use crate::{
    cycle::{CycleResult, Reading, Slot},
    sensors::SensorDescriptor,
};

pub trait Reporter {
    fn report(&self, cycle: &CycleResult<'_>) -> Vec<String>;
}

/// Console format: `<name>: <value> <unit> (<voltage> V)` and `<name>: ERROR <kind>`.
#[derive(Debug, Clone, Default)]
pub struct TextReporter {
    marker: Option<String>,
    group_headers: bool,
}

impl TextReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `marker` as the first line of every cycle. Capture scripts split on it.
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: Some(marker.into()),
            ..Self::default()
        }
    }

    /// Emits `Reading <group>...` whenever the device group changes between channels.
    pub fn with_group_headers(mut self) -> Self {
        self.group_headers = true;
        self
    }

    fn line(slot: &Slot<'_>) -> String {
        match slot {
            Ok(reading) => {
                let mut line = format!(
                    "{}: {}",
                    reading.descriptor.name(),
                    value_with_unit(reading)
                );
                if let Some(voltage) = reading.voltage {
                    line.push_str(&format!(" ({:.2} V)", voltage));
                }
                line
            }
            Err(e) => format!("{}: ERROR {}", e.descriptor.name(), e.kind()),
        }
    }
}

impl Reporter for TextReporter {
    fn report(&self, cycle: &CycleResult<'_>) -> Vec<String> {
        let mut lines: Vec<String> = self.marker.iter().cloned().collect();
        let mut current = None;
        for slot in cycle {
            let group = descriptor(slot).group();
            if self.group_headers && group != current {
                if let Some(group) = group {
                    lines.push(format!("Reading {}...", group));
                }
            }
            current = group;
            lines.push(Self::line(slot));
        }
        lines
    }
}

fn descriptor<'a>(slot: &Slot<'a>) -> &'a SensorDescriptor {
    match slot {
        Ok(reading) => reading.descriptor,
        Err(e) => e.descriptor,
    }
}

fn value_with_unit(reading: &Reading<'_>) -> String {
    let precision = reading.descriptor.precision();
    match reading.descriptor.unit() {
        "" => format!("{:.*}", precision, reading.engineering),
        unit => format!("{:.*} {}", precision, reading.engineering, unit),
    }
}

/// Log-store format, one row per slot:
/// `timestamp_ms,name,value,unit,voltage,status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReporter;

impl CsvReporter {
    pub const HEADER: &'static str = "timestamp_ms,name,value,unit,voltage,status";
}

impl Reporter for CsvReporter {
    fn report(&self, cycle: &CycleResult<'_>) -> Vec<String> {
        cycle
            .iter()
            .map(|slot| match slot {
                Ok(r) => format!(
                    "{},{},{:.*},{},{},ok",
                    r.timestamp_ms,
                    r.descriptor.name(),
                    r.descriptor.precision(),
                    r.engineering,
                    r.descriptor.unit(),
                    r.voltage.map(|v| format!("{:.2}", v)).unwrap_or_default(),
                ),
                Err(e) => format!(
                    "{},{},,{},,{}",
                    e.timestamp_ms,
                    e.descriptor.name(),
                    e.descriptor.unit(),
                    e.kind()
                ),
            })
            .collect()
    }
}
