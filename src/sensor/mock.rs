use crate::detector::Sample;
use crate::error::AppError;
use crate::sensor::{
    LightSensorDriver, LightSensorFactory, SampleCallback, SampleSource, SubscriptionHandle,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct MockLightBehavior {
    pub open_ok: bool,
    pub read_ok: bool,
    pub lux: f64,
}

impl MockLightBehavior {
    pub fn ok() -> Self {
        Self {
            open_ok: true,
            read_ok: true,
            lux: 0.0,
        }
    }

    pub fn with_lux(lux: f64) -> Self {
        Self {
            open_ok: true,
            read_ok: true,
            lux,
        }
    }

    pub fn fail_open() -> Self {
        Self {
            open_ok: false,
            read_ok: true,
            lux: 0.0,
        }
    }

    pub fn fail_read() -> Self {
        Self {
            open_ok: true,
            read_ok: false,
            lux: 0.0,
        }
    }
}

/// Hands out one driver per `open`, each following the next scripted behavior.
pub struct MockLightFactory {
    behaviors: Vec<MockLightBehavior>,
    next_index: usize,
}

impl MockLightFactory {
    pub fn new(behaviors: Vec<MockLightBehavior>) -> Self {
        Self {
            behaviors,
            next_index: 0,
        }
    }

    fn next_behavior(&mut self) -> MockLightBehavior {
        let behavior = self
            .behaviors
            .get(self.next_index)
            .copied()
            .unwrap_or_else(MockLightBehavior::ok);
        self.next_index += 1;
        behavior
    }
}

pub struct MockLightDriver {
    behavior: MockLightBehavior,
}

impl LightSensorDriver for MockLightDriver {
    fn read_lux(&mut self) -> Result<f64, AppError> {
        if self.behavior.read_ok {
            Ok(self.behavior.lux)
        } else {
            Err(AppError::Sensor("mock read lux failed".to_string()))
        }
    }
}

impl LightSensorFactory for MockLightFactory {
    type Driver = MockLightDriver;

    fn open(&mut self) -> Result<Self::Driver, AppError> {
        let behavior = self.next_behavior();
        if behavior.open_ok {
            Ok(MockLightDriver { behavior })
        } else {
            Err(AppError::Sensor("mock open failed".to_string()))
        }
    }
}

#[derive(Default)]
struct ManualInner {
    callbacks: BTreeMap<SubscriptionHandle, SampleCallback>,
    next_id: u64,
    fail_subscribe: bool,
}

/// Sample source driven by hand: `push` delivers synchronously to every subscriber.
///
/// Clones share the same subscriber list, so a test can keep one clone while
/// handing another to the code under test.
#[derive(Clone, Default)]
pub struct ManualSampleSource {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualSampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `subscribe` always fails, like an absent sensor.
    pub fn unavailable() -> Self {
        let source = Self::default();
        if let Ok(mut inner) = source.inner.lock() {
            inner.fail_subscribe = true;
        }
        source
    }

    /// Returns how many subscribers received the sample.
    pub fn push(&self, sample: Sample) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        for callback in inner.callbacks.values_mut() {
            callback(sample);
        }
        inner.callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.callbacks.len()).unwrap_or(0)
    }
}

impl SampleSource for ManualSampleSource {
    fn subscribe(&mut self, callback: SampleCallback) -> Result<SubscriptionHandle, AppError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Sensor("manual source lock poisoned".to_string()))?;
        if inner.fail_subscribe {
            return Err(AppError::Sensor("light sensor unavailable".to_string()));
        }
        inner.next_id += 1;
        let handle = SubscriptionHandle::new(inner.next_id);
        inner.callbacks.insert(handle, callback);
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.callbacks.remove(&handle);
        }
    }
}
