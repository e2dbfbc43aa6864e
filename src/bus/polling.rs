use crate::detector::Sample;
use crate::error::AppError;
use crate::sensor::{
    LightSensorDriver, LightSensorFactory, SampleCallback, SampleSource, SubscriptionHandle,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_CHECK_STEP: Duration = Duration::from_millis(10);

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Turns a pull-based light sensor into a push-based sample source.
///
/// Each subscription opens its own driver and gets a dedicated polling thread.
pub struct PollingSampleSource<F> {
    factory: F,
    interval: Duration,
    next_id: u64,
    workers: HashMap<SubscriptionHandle, Worker>,
}

impl<F> PollingSampleSource<F>
where
    F: LightSensorFactory,
{
    pub fn new(factory: F, interval: Duration) -> Self {
        Self {
            factory,
            interval,
            next_id: 0,
            workers: HashMap::new(),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.workers.len()
    }
}

impl<F> SampleSource for PollingSampleSource<F>
where
    F: LightSensorFactory,
{
    fn subscribe(&mut self, callback: SampleCallback) -> Result<SubscriptionHandle, AppError> {
        let driver = self.factory.open()?;
        self.next_id += 1;
        let handle = SubscriptionHandle::new(self.next_id);
        let stop = Arc::new(AtomicBool::new(false));
        let thread = spawn_polling_thread(driver, callback, self.interval, Arc::clone(&stop));
        info!(
            subscription = handle.id(),
            interval_ms = self.interval.as_millis(),
            "Light sensor polling started"
        );
        self.workers.insert(
            handle,
            Worker {
                stop,
                handle: thread,
            },
        );
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        let Some(worker) = self.workers.remove(&handle) else {
            debug!(subscription = handle.id(), "Unsubscribe for unknown subscription");
            return;
        };
        worker.stop.store(true, Ordering::Relaxed);
        if worker.handle.join().is_err() {
            warn!(subscription = handle.id(), "Polling thread panicked");
        }
        info!(subscription = handle.id(), "Light sensor polling stopped");
    }
}

impl<F> Drop for PollingSampleSource<F> {
    fn drop(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.stop.store(true, Ordering::Relaxed);
            let _ = worker.handle.join();
        }
    }
}

fn spawn_polling_thread<D>(
    mut driver: D,
    mut callback: SampleCallback,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    D: LightSensorDriver + Send + 'static,
{
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            match driver.read_lux() {
                Ok(lux) => callback(Sample::new(lux, Instant::now())),
                Err(err) => warn!(error = %err, "Failed to read illuminance"),
            }

            sleep_with_stop(interval, &stop, cycle_start);
        }
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let step = STOP_CHECK_STEP.min(remaining - slept);
        std::thread::sleep(step);
        slept += step;
    }
}
