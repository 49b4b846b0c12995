//! PeriodicTask: an owned handle to a recurring background job.
//!
//! The job stops when the handle is stopped or dropped, together with any
//! tick still in flight, so nothing keeps a reference to torn-down state.

use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub struct PeriodicTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Run `tick` every `period`, first after one full period.
    ///
    /// Each tick runs as its own task: a slow tick never delays the next one,
    /// and ticks are not mutually exclusive.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Dropping the set (when this task is aborted) aborts in-flight ticks
            let mut in_flight = JoinSet::new();

            loop {
                interval.tick().await;
                while in_flight.try_join_next().is_some() {}
                in_flight.spawn(tick());
            }
        });

        debug!("Started periodic task {} every {:?}", name, period);
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task. Safe to call multiple times.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Stopped periodic task {}", self.name);
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
