//! Light-event debouncer that turns illuminance samples into counted prostrations.
//!
//! Each sample is classified into one of three zones: dark (`lux < low`),
//! bright (`lux > high`) or the band in between. A prostration is counted once
//! the signal has stayed dark for at least `dark_hold`, and only once per dark
//! interval. A bright sample re-arms the detector. A band sample restarts the
//! dwell timer but keeps the counted flag, so a long prostration that flickers
//! into the band is not counted twice.
//!
//! Dwell is measured by comparing sample timestamps as they arrive; there is
//! no timer.

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_LOW_THRESHOLD_LUX: f64 = 45.0;
pub const DEFAULT_HIGH_THRESHOLD_LUX: f64 = 80.0;
pub const DEFAULT_DARK_HOLD: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorConfigError {
    #[error("thresholds must be finite (low={low}, high={high})")]
    NonFiniteThreshold { low: f64, high: f64 },
    #[error("thresholds must be non-negative (low={low}, high={high})")]
    NegativeThreshold { low: f64, high: f64 },
    #[error("low threshold {low} must be below high threshold {high}")]
    InvertedThresholds { low: f64, high: f64 },
    #[error("dark hold duration must be greater than zero")]
    ZeroDarkHold,
}

/// Thresholds and dwell time, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    low_threshold_lux: f64,
    high_threshold_lux: f64,
    dark_hold: Duration,
}

impl DetectorConfig {
    pub fn new(
        low_threshold_lux: f64,
        high_threshold_lux: f64,
        dark_hold: Duration,
    ) -> Result<Self, DetectorConfigError> {
        let (low, high) = (low_threshold_lux, high_threshold_lux);
        if !low.is_finite() || !high.is_finite() {
            return Err(DetectorConfigError::NonFiniteThreshold { low, high });
        }
        if low < 0.0 || high < 0.0 {
            return Err(DetectorConfigError::NegativeThreshold { low, high });
        }
        if low >= high {
            return Err(DetectorConfigError::InvertedThresholds { low, high });
        }
        if dark_hold.is_zero() {
            return Err(DetectorConfigError::ZeroDarkHold);
        }
        Ok(Self {
            low_threshold_lux,
            high_threshold_lux,
            dark_hold,
        })
    }

    pub fn low_threshold_lux(&self) -> f64 {
        self.low_threshold_lux
    }

    pub fn high_threshold_lux(&self) -> f64 {
        self.high_threshold_lux
    }

    pub fn dark_hold(&self) -> Duration {
        self.dark_hold
    }

    pub fn classify(&self, lux: f64) -> LightZone {
        if lux < self.low_threshold_lux {
            LightZone::Dark
        } else if lux > self.high_threshold_lux {
            LightZone::Bright
        } else {
            LightZone::Band
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            low_threshold_lux: DEFAULT_LOW_THRESHOLD_LUX,
            high_threshold_lux: DEFAULT_HIGH_THRESHOLD_LUX,
            dark_hold: DEFAULT_DARK_HOLD,
        }
    }
}

/// A single illuminance reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub lux: f64,
    pub timestamp: Instant,
}

impl Sample {
    pub fn new(lux: f64, timestamp: Instant) -> Self {
        Self { lux, timestamp }
    }

    pub fn is_valid(&self) -> bool {
        self.lux.is_finite() && self.lux >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightZone {
    Dark,
    Band,
    Bright,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProstrationEvent {
    pub prostration_count: u32,
    pub bow_count: u32,
    /// How long the sensor had been dark when the count fired.
    pub duration: Duration,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    /// Negative or non-finite lux; nothing changed.
    Rejected,
    Tracked { zone: LightZone },
    Counted(ProstrationEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectorSnapshot {
    pub prostration_count: u32,
    pub bow_count: u32,
    pub last_event_duration: Option<Duration>,
    pub dark_since: Option<Instant>,
    pub is_counted: bool,
}

#[derive(Debug)]
pub struct LightEventDetector {
    config: DetectorConfig,
    dark_since: Option<Instant>,
    is_counted: bool,
    prostration_count: u32,
    last_event_duration: Option<Duration>,
}

impl LightEventDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            dark_since: None,
            is_counted: false,
            prostration_count: 0,
            last_event_duration: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Swap in a new configuration for the next run. Counts are kept.
    pub fn reconfigure(&mut self, config: DetectorConfig) {
        self.config = config;
        self.clear_tracking();
    }

    pub fn clear_tracking(&mut self) {
        self.dark_since = None;
        self.is_counted = false;
    }

    pub fn reset(&mut self) {
        self.prostration_count = 0;
        self.last_event_duration = None;
        self.clear_tracking();
    }

    pub fn prostration_count(&self) -> u32 {
        self.prostration_count
    }

    pub fn bow_count(&self) -> u32 {
        self.prostration_count / 2
    }

    pub fn last_event_duration(&self) -> Option<Duration> {
        self.last_event_duration
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        DetectorSnapshot {
            prostration_count: self.prostration_count,
            bow_count: self.bow_count(),
            last_event_duration: self.last_event_duration,
            dark_since: self.dark_since,
            is_counted: self.is_counted,
        }
    }

    pub fn ingest(&mut self, sample: Sample) -> IngestOutcome {
        if !sample.is_valid() {
            debug!(lux = sample.lux, "Ignoring malformed light sample");
            return IngestOutcome::Rejected;
        }

        let zone = self.config.classify(sample.lux);
        match zone {
            LightZone::Dark => {
                let Some(dark_since) = self.dark_since else {
                    self.dark_since = Some(sample.timestamp);
                    debug!(lux = sample.lux, "Started darkness timer");
                    return IngestOutcome::Tracked { zone };
                };
                let elapsed = sample.timestamp.saturating_duration_since(dark_since);
                if !self.is_counted && elapsed >= self.config.dark_hold {
                    return IngestOutcome::Counted(self.count(elapsed, sample.timestamp));
                }
            }
            LightZone::Bright => {
                if self.dark_since.is_some() || self.is_counted {
                    debug!(lux = sample.lux, "Bright again, resetting dark state");
                }
                self.clear_tracking();
            }
            LightZone::Band => {
                if self.dark_since.take().is_some() {
                    debug!(lux = sample.lux, "Lux between thresholds, darkness timer cleared");
                }
            }
        }
        IngestOutcome::Tracked { zone }
    }

    fn count(&mut self, duration: Duration, timestamp: Instant) -> ProstrationEvent {
        self.prostration_count = self.prostration_count.saturating_add(1);
        self.last_event_duration = Some(duration);
        self.is_counted = true;
        let event = ProstrationEvent {
            prostration_count: self.prostration_count,
            bow_count: self.bow_count(),
            duration,
            timestamp,
        };
        info!(
            prostrations = event.prostration_count,
            bows = event.bow_count,
            duration_ms = duration.as_millis(),
            "Prostration counted"
        );
        event
    }
}

impl Default for LightEventDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
