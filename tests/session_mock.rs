use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use sujood_counter::bus::polling::PollingSampleSource;
use sujood_counter::detector::{DetectorConfig, Sample};
use sujood_counter::error::AppError;
use sujood_counter::sensor::mock::{ManualSampleSource, MockLightBehavior, MockLightFactory};
use sujood_counter::session::PrayerSession;
use sujood_counter::state::AppState;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[test]
fn polled_dark_sensor_counts_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
    let factory = MockLightFactory::new(vec![MockLightBehavior::with_lux(3.0)]);
    let source = PollingSampleSource::new(factory, ms(2));
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut session = PrayerSession::new(Box::new(source), Arc::clone(&state));

    session.start(DetectorConfig::new(45.0, 80.0, ms(20))?)?;

    let deadline = Instant::now() + Duration::from_secs(2);
    while session.snapshot()?.prostration_count == 0 && Instant::now() < deadline {
        std::thread::sleep(ms(5));
    }
    // Still dark: the same interval must not be counted again.
    std::thread::sleep(ms(60));
    session.stop()?;

    assert_eq!(session.snapshot()?.prostration_count, 1);
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert!(!guard.running());
    assert_eq!(guard.counts().prostration_count, 1);
    assert!(guard.last_prostration().is_some());
    assert_eq!(guard.lux().map(|reading| reading.lux), Some(3.0));
    Ok(())
}

#[test]
fn prayer_cycle_counts_bows_every_second_prostration() -> Result<(), Box<dyn std::error::Error>> {
    let source = ManualSampleSource::new();
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut session = PrayerSession::new(Box::new(source.clone()), Arc::clone(&state));
    let counts_rx = state
        .read()
        .map_err(|_| AppError::StateLock)?
        .subscribe_counts();

    session.start(DetectorConfig::new(10.0, 40.0, ms(1200))?)?;

    let base = Instant::now();
    let mut bows = Vec::new();
    for rakah in 0..4u64 {
        let start = rakah * 5000;
        source.push(Sample::new(300.0, base + ms(start)));
        source.push(Sample::new(4.0, base + ms(start + 200)));
        // Brief band flicker mid-prostration restarts the dwell timer.
        source.push(Sample::new(25.0, base + ms(start + 600)));
        source.push(Sample::new(4.0, base + ms(start + 700)));
        source.push(Sample::new(4.0, base + ms(start + 1700)));
        source.push(Sample::new(4.0, base + ms(start + 2000)));
        bows.push(counts_rx.borrow().bow_count);
    }

    assert_eq!(bows, vec![0, 1, 1, 2]);
    let counts = *state.read().map_err(|_| AppError::StateLock)?.counts();
    assert_eq!(counts.prostration_count, 4);
    assert_eq!(counts.last_event_duration, Some(ms(1300)));
    Ok(())
}
