use crate::detector::Sample;
use crate::error::AppError;

#[cfg(target_os = "linux")]
pub mod bh1750;
pub mod iio;
pub mod mock;

/// Callback invoked once per delivered sample, on the source's delivery thread.
pub type SampleCallback = Box<dyn FnMut(Sample) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Push-based stream of illuminance samples.
///
/// Once `unsubscribe` returns, the callback registered under that handle is
/// never invoked again.
pub trait SampleSource {
    fn subscribe(&mut self, callback: SampleCallback) -> Result<SubscriptionHandle, AppError>;
    fn unsubscribe(&mut self, handle: SubscriptionHandle);
}

pub trait LightSensorDriver {
    /// Read the current illuminance in lux.
    fn read_lux(&mut self) -> Result<f64, AppError>;
}

pub trait LightSensorFactory {
    type Driver: LightSensorDriver + Send + 'static;

    /// Open and initialize the sensor. Called once per subscription.
    fn open(&mut self) -> Result<Self::Driver, AppError>;
}
