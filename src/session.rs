use crate::detector::{DetectorConfig, IngestOutcome, LightEventDetector, Sample};
use crate::error::AppError;
use crate::sensor::{SampleCallback, SampleSource, SubscriptionHandle};
use crate::state::{AppState, CountSnapshot, LuxReading, ProstrationRecord};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Owns the detector and the single sample subscription behind start/stop/reset.
///
/// Every detector mutation goes through one mutex, so sample delivery on the
/// source's thread is serialized with the control operations.
pub struct PrayerSession {
    source: Box<dyn SampleSource + Send>,
    detector: Arc<Mutex<LightEventDetector>>,
    state: Arc<RwLock<AppState>>,
    subscription: Option<SubscriptionHandle>,
}

impl PrayerSession {
    pub fn new(source: Box<dyn SampleSource + Send>, state: Arc<RwLock<AppState>>) -> Self {
        Self {
            source,
            detector: Arc::new(Mutex::new(LightEventDetector::default())),
            state,
            subscription: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn snapshot(&self) -> Result<CountSnapshot, AppError> {
        let detector = self.detector.lock().map_err(|_| AppError::DetectorLock)?;
        Ok(detector.snapshot().into())
    }

    /// Begin counting with `config`. Counts from earlier runs are kept.
    ///
    /// Does nothing when already running. If the source refuses the
    /// subscription the session stays stopped and the error is returned.
    pub fn start(&mut self, config: DetectorConfig) -> Result<(), AppError> {
        if self.subscription.is_some() {
            debug!("Session already running, ignoring start");
            return Ok(());
        }

        {
            let mut detector = self.detector.lock().map_err(|_| AppError::DetectorLock)?;
            detector.reconfigure(config);
        }

        let callback = ingest_callback(Arc::clone(&self.detector), Arc::clone(&self.state));
        let handle = match self.source.subscribe(callback) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "Failed to subscribe to light sensor");
                return Err(err);
            }
        };

        let Ok(mut guard) = self.state.write() else {
            self.source.unsubscribe(handle);
            warn!("State lock poisoned, released light sensor subscription");
            return Err(AppError::StateLock);
        };
        guard.set_running(true);
        drop(guard);
        self.subscription = Some(handle);
        info!(
            low_lux = config.low_threshold_lux(),
            high_lux = config.high_threshold_lux(),
            dark_hold_ms = config.dark_hold().as_millis(),
            "Prayer session started"
        );
        Ok(())
    }

    /// Release the subscription and drop any in-progress dark interval.
    pub fn stop(&mut self) -> Result<(), AppError> {
        let Some(handle) = self.subscription.take() else {
            debug!("Session not running, ignoring stop");
            return Ok(());
        };
        self.source.unsubscribe(handle);

        {
            let mut detector = self.detector.lock().map_err(|_| AppError::DetectorLock)?;
            detector.clear_tracking();
        }

        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_running(false);
        info!("Prayer session stopped");
        Ok(())
    }

    /// Zero the counters. The running state is left as it is.
    pub fn reset(&mut self) -> Result<(), AppError> {
        // Publish under the detector guard so an in-flight sample cannot
        // overwrite the zeroed counts with pre-reset values.
        let mut detector = self.detector.lock().map_err(|_| AppError::DetectorLock)?;
        detector.reset();
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_counts(CountSnapshot::from(detector.snapshot()));
        info!("Prayer counters reset");
        Ok(())
    }
}

impl Drop for PrayerSession {
    fn drop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.source.unsubscribe(handle);
        }
    }
}

fn ingest_callback(
    detector: Arc<Mutex<LightEventDetector>>,
    state: Arc<RwLock<AppState>>,
) -> SampleCallback {
    Box::new(move |sample: Sample| {
        let Ok(mut detector) = detector.lock() else {
            warn!("Detector lock poisoned, dropping sample");
            return;
        };
        let outcome = detector.ingest(sample);
        if outcome == IngestOutcome::Rejected {
            return;
        }

        // Lock order is detector then state, everywhere.
        let Ok(mut guard) = state.write() else {
            warn!("State lock poisoned, dropping sample");
            return;
        };
        let now = SystemTime::now();
        guard.set_lux(LuxReading {
            lux: sample.lux,
            timestamp: now,
        });
        guard.set_counts(CountSnapshot::from(detector.snapshot()));
        if let IngestOutcome::Counted(event) = outcome {
            guard.record_prostration(ProstrationRecord {
                prostration_count: event.prostration_count,
                bow_count: event.bow_count,
                duration: event.duration,
                timestamp: now,
            });
        }
    })
}
