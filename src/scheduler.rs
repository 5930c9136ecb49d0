use {
    crate::{
        cycle::AcquisitionCycle, registry::SensorRegistry, report::Reporter, sink::Sink,
    },
    async_channel::{Receiver, Sender},
    log::{debug, info},
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::time::{self, Instant, Interval, MissedTickBehavior},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Idle,
    Waiting,
    Acquiring,
    Reporting,
}

/// Wakes a waiting scheduler early.
///
/// Signals coalesce: any number of notifications while a cycle is running start exactly one
/// extra cycle.
#[derive(Debug, Clone)]
pub struct ReadyHandle {
    tx: Sender<()>,
}

impl ReadyHandle {
    pub fn notify(&self) {
        // Full means a wake-up is already pending.
        let _ = self.tx.try_send(());
    }
}

/// Stops the scheduler the next time it enters `Waiting`.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Interval,
    Ready,
}

/// Single-threaded cooperative polling loop.
///
/// The only suspension point is the wait in `Waiting`; a cycle always runs to completion.
pub struct PeriodicScheduler {
    interval: Duration,
    state: SchedulerState,
    cycle: AcquisitionCycle,
    cycles: u64,
    ready_tx: Sender<()>,
    ready_rx: Receiver<()>,
    shutdown: ShutdownHandle,
    observer: Option<Box<dyn FnMut(SchedulerState)>>,
}

impl PeriodicScheduler {
    pub fn new(interval: Duration) -> Self {
        let (ready_tx, ready_rx) = async_channel::bounded(1);
        Self {
            interval,
            state: SchedulerState::Idle,
            cycle: AcquisitionCycle::new(),
            cycles: 0,
            ready_tx,
            ready_rx,
            shutdown: ShutdownHandle::default(),
            observer: None,
        }
    }

    /// Called with every state the scheduler enters, starting with `Idle`.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(SchedulerState) + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn ready_handle(&self) -> ReadyHandle {
        ReadyHandle {
            tx: self.ready_tx.clone(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls `registry` until the shutdown handle is triggered.
    pub async fn run<R, S>(&mut self, registry: &mut SensorRegistry, reporter: &R, sink: &mut S)
    where
        R: Reporter + ?Sized,
        S: Sink + ?Sized,
    {
        self.enter(SchedulerState::Idle);

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Polling {} sensors every {:?}",
            registry.len(),
            self.interval
        );
        self.enter(SchedulerState::Acquiring);

        loop {
            let lines = {
                let result = self.cycle.run_once(registry);
                self.enter(SchedulerState::Reporting);
                if result.errors() > 0 {
                    debug!(
                        "Cycle {}: {}/{} sensors failed",
                        self.cycles,
                        result.errors(),
                        result.len()
                    );
                }
                reporter.report(&result)
            };
            sink.write_lines(&lines);
            self.cycles += 1;

            self.enter(SchedulerState::Waiting);
            if self.shutdown.is_triggered() {
                info!("Shutdown requested after {} cycles", self.cycles);
                return;
            }

            let wake = self.wait(&mut ticker).await;
            debug!("Woken by {:?}", wake);
            self.enter(SchedulerState::Acquiring);
        }
    }

    async fn wait(&mut self, ticker: &mut Interval) -> Wake {
        tokio::select! {
            _ = ticker.tick() => Wake::Interval,
            Ok(()) = self.ready_rx.recv() => {
                ticker.reset();
                Wake::Ready
            }
        }
    }

    fn enter(&mut self, state: SchedulerState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
        if let Some(observer) = self.observer.as_mut() {
            observer(state);
        }
    }
}
