//! Bridge for sensors whose output completes on its own schedule.
//!
//! The driver side owns a [`Publisher`] and pushes each finished output. Every push also wakes
//! the [`PeriodicScheduler`](crate::scheduler::PeriodicScheduler), so the next cycle picks the
//! fresh value up. Descriptors read the latest output through a [`Subscriber`].

use {
    crate::{error::Fault, scheduler::ReadyHandle},
    tokio::sync::watch,
};

type Slot<T> = Option<Result<T, Fault>>;

pub fn channel<T>(ready: ReadyHandle) -> (Publisher<T>, Subscriber<T>) {
    let (tx, rx) = watch::channel(None);
    (Publisher { tx, ready }, Subscriber { rx })
}

pub struct Publisher<T> {
    tx: watch::Sender<Slot<T>>,
    ready: ReadyHandle,
}

impl<T> Publisher<T> {
    pub fn push(&self, output: Result<T, Fault>) {
        self.tx.send_replace(Some(output));
        self.ready.notify();
    }
}

#[derive(Debug)]
pub struct Subscriber<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    /// Latest output projected to one channel; `NotReady` until the first push.
    pub fn latest<F>(&self, project: F) -> Result<f64, Fault>
    where
        F: Fn(&T) -> f64,
    {
        match &*self.rx.borrow() {
            None => Err(Fault::not_ready()),
            Some(Ok(output)) => Ok(project(output)),
            Some(Err(fault)) => Err(fault.clone()),
        }
    }

    /// Read function for a descriptor showing one projection of the output.
    pub fn channel<F>(&self, project: F) -> impl FnMut() -> Result<f64, Fault> + 'static
    where
        F: Fn(&T) -> f64 + 'static,
    {
        let subscriber = self.clone();
        move || subscriber.latest(&project)
    }
}
