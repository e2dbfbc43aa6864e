use crate::detector::DetectorSnapshot;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuxReading {
    pub lux: f64,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountSnapshot {
    pub prostration_count: u32,
    pub bow_count: u32,
    pub last_event_duration: Option<Duration>,
}

impl From<DetectorSnapshot> for CountSnapshot {
    fn from(snapshot: DetectorSnapshot) -> Self {
        Self {
            prostration_count: snapshot.prostration_count,
            bow_count: snapshot.bow_count,
            last_event_duration: snapshot.last_event_duration,
        }
    }
}

/// The "counted" signal: one value per prostration, for feedback consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProstrationRecord {
    pub prostration_count: u32,
    pub bow_count: u32,
    pub duration: Duration,
    pub timestamp: SystemTime,
}

/// Read-only view of the session for display consumers.
///
/// Only the session writes here; every setter also publishes on a watch
/// channel so consumers can await changes instead of polling.
#[derive(Debug)]
pub struct AppState {
    running: bool,
    running_tx: watch::Sender<bool>,
    lux: Option<LuxReading>,
    lux_tx: watch::Sender<Option<LuxReading>>,
    counts: CountSnapshot,
    counts_tx: watch::Sender<CountSnapshot>,
    last_prostration: Option<ProstrationRecord>,
    prostration_tx: watch::Sender<Option<ProstrationRecord>>,
}

impl AppState {
    pub fn new() -> Self {
        let (running_tx, _running_rx) = watch::channel(false);
        let (lux_tx, _lux_rx) = watch::channel(None);
        let (counts_tx, _counts_rx) = watch::channel(CountSnapshot::default());
        let (prostration_tx, _prostration_rx) = watch::channel(None);
        Self {
            running: false,
            running_tx,
            lux: None,
            lux_tx,
            counts: CountSnapshot::default(),
            counts_tx,
            last_prostration: None,
            prostration_tx,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running_tx.subscribe()
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
        self.running_tx.send_replace(running);
    }

    pub fn lux(&self) -> Option<&LuxReading> {
        self.lux.as_ref()
    }

    pub fn subscribe_lux(&self) -> watch::Receiver<Option<LuxReading>> {
        self.lux_tx.subscribe()
    }

    pub fn set_lux(&mut self, reading: LuxReading) {
        self.lux = Some(reading);
        self.lux_tx.send_replace(Some(reading));
    }

    pub fn counts(&self) -> &CountSnapshot {
        &self.counts
    }

    pub fn subscribe_counts(&self) -> watch::Receiver<CountSnapshot> {
        self.counts_tx.subscribe()
    }

    /// Publishes only when the counts actually changed.
    pub fn set_counts(&mut self, counts: CountSnapshot) {
        if self.counts == counts {
            return;
        }
        self.counts = counts;
        self.counts_tx.send_replace(counts);
    }

    pub fn last_prostration(&self) -> Option<&ProstrationRecord> {
        self.last_prostration.as_ref()
    }

    pub fn subscribe_prostrations(&self) -> watch::Receiver<Option<ProstrationRecord>> {
        self.prostration_tx.subscribe()
    }

    pub fn record_prostration(&mut self, record: ProstrationRecord) {
        self.last_prostration = Some(record);
        self.prostration_tx.send_replace(Some(record));
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
