//! SGP30 eCO2/tVOC sensor.
//!
//! The on-chip baseline algorithm needs a measurement every second regardless of how often the
//! rig reports, so the sensor runs in its own task and hands results over through
//! [`fusion`](crate::fusion).

use {
    crate::{
        error::{ErrorKind, Fault, SetupError},
        fusion::{Publisher, Subscriber},
        sensors::{SensorDescriptor, VoltageMap},
    },
    linux_embedded_hal::{Delay, I2cdev},
    log::{debug, info},
    sgp30::Sgp30,
    std::time::Duration,
    tokio::time::{interval, MissedTickBehavior},
};

pub const ADDRESS: u8 = 0x58;
/// Cadence required by the baseline compensation algorithm.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQuality {
    pub co2eq_ppm: u16,
    pub tvoc_ppb: u16,
}

pub trait AirQualitySource {
    fn sample(&mut self) -> Result<AirQuality, Fault>;
}

impl AirQualitySource for Sgp30<I2cdev, Delay> {
    fn sample(&mut self) -> Result<AirQuality, Fault> {
        let m = self.measure().map_err(fault)?;
        Ok(AirQuality {
            co2eq_ppm: m.co2eq_ppm,
            tvoc_ppb: m.tvoc_ppb,
        })
    }
}

fn fault<E: std::fmt::Debug>(e: sgp30::Error<E>) -> Fault {
    match e {
        sgp30::Error::Crc => Fault::new(ErrorKind::ChecksumFailure),
        sgp30::Error::NotInitialized => Fault::not_ready(),
        sgp30::Error::I2c(e) => {
            debug!("SGP30 I2C error: {:?}", e);
            Fault::bus()
        }
    }
}

/// Opens the sensor, runs its mandatory self-test and starts the measurement phase.
pub fn initialize(i2c_dev: &str) -> Result<Sgp30<I2cdev, Delay>, SetupError> {
    let dev = I2cdev::new(i2c_dev).map_err(|e| SetupError::Init {
        sensor: "SGP30",
        detail: format!("{}: {:?}", i2c_dev, e),
    })?;

    let mut sgp = Sgp30::new(dev, ADDRESS, Delay);

    match sgp.selftest() {
        Ok(true) => info!("SGP30 self-test passed"),
        Ok(false) => {
            return Err(SetupError::SelfTest {
                sensor: "SGP30",
                detail: "chip reported failure".into(),
            })
        }
        Err(e) => {
            return Err(SetupError::SelfTest {
                sensor: "SGP30",
                detail: format!("{:?}", e),
            })
        }
    }

    sgp.init().map_err(|e| SetupError::Init {
        sensor: "SGP30",
        detail: format!("{:?}", e),
    })?;

    Ok(sgp)
}

/// Samples `source` every `period`, publishing each result once `conditioning` samples have
/// been taken. Conditioning samples only feed the chip's algorithm.
pub async fn run<S: AirQualitySource>(
    mut source: S,
    publisher: Publisher<AirQuality>,
    mut conditioning: u32,
    period: Duration,
) {
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;

        let sample = source.sample();
        if conditioning > 0 {
            conditioning -= 1;
            match &sample {
                Ok(_) => debug!("SGP30 conditioning, {} samples left", conditioning),
                Err(e) => debug!("SGP30 conditioning sample failed: {}", e),
            }
            if conditioning == 0 {
                info!("SGP30 conditioning complete");
            }
            continue;
        }

        publisher.push(sample);
    }
}

pub fn descriptors(subscriber: &Subscriber<AirQuality>) -> [SensorDescriptor; 2] {
    [
        SensorDescriptor::new("tVOC", "ppb", subscriber.channel(|s| f64::from(s.tvoc_ppb)))
            .with_group("SGP30")
            .with_valid_range(0.0..=60000.0)
            .with_voltage(VoltageMap::span_3v3(0.0, 60000.0))
            .with_precision(0),
        SensorDescriptor::new(
            "CO2eq",
            "ppm",
            subscriber.channel(|s| f64::from(s.co2eq_ppm)),
        )
        .with_group("SGP30")
        .with_valid_range(400.0..=60000.0)
        .with_voltage(VoltageMap::span_3v3(400.0, 60000.0))
        .with_precision(0),
    ]
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{fusion, scheduler::PeriodicScheduler},
        std::sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        tokio::{task, time},
    };

    struct Script {
        next: u16,
    }

    impl AirQualitySource for Script {
        fn sample(&mut self) -> Result<AirQuality, Fault> {
            self.next += 1;
            Ok(AirQuality {
                co2eq_ppm: 400 + self.next,
                tvoc_ppb: self.next,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn conditioning_samples_are_not_published() {
        let scheduler = PeriodicScheduler::new(Duration::from_secs(10));
        let (publisher, subscriber) = fusion::channel(scheduler.ready_handle());
        let [mut tvoc, mut co2] = descriptors(&subscriber);

        let task = tokio::spawn(run(Script { next: 0 }, publisher, 3, SAMPLE_PERIOD));

        // samples at t=0,1,2 condition; t=3 is the first published one
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(co2.read().unwrap_err().kind, ErrorKind::NotReady);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tvoc.read(), Ok(4.0));
        assert_eq!(co2.read(), Ok(404.0));

        task.abort();
    }

    struct Counting(Arc<AtomicU32>);

    impl AirQualitySource for Counting {
        fn sample(&mut self) -> Result<AirQuality, Fault> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                return Err(Fault::bus());
            }
            Ok(AirQuality {
                co2eq_ppm: 400,
                tvoc_ppb: n as u16,
            })
        }
    }

    async fn settle() {
        for _ in 0..20 {
            task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_runtime_does_not_burst_samples() {
        let scheduler = PeriodicScheduler::new(Duration::from_secs(10));
        let (publisher, _subscriber) = fusion::channel(scheduler.ready_handle());
        let samples = Arc::new(AtomicU32::new(0));

        let task = tokio::spawn(run(Counting(samples.clone()), publisher, 1, SAMPLE_PERIOD));
        settle().await;
        assert_eq!(samples.load(Ordering::SeqCst), 1);

        // five periods pass without the task getting to run
        time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(samples.load(Ordering::SeqCst), 2);

        task.abort();
    }
}
