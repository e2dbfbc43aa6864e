use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use sujood_counter::api::{self, ApiState};
use sujood_counter::bus::polling::PollingSampleSource;
use sujood_counter::config::{self, SensorDriverKind};
use sujood_counter::sensor::SampleSource;
use sujood_counter::sensor::iio::IioLightFactory;
use sujood_counter::session::PrayerSession;
use sujood_counter::state::AppState;
use tokio::sync::watch;

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "sujood-counter starting"
    );

    let detector_config = config.detector_config()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let source = build_sample_source(&config)?;
    let mut session = PrayerSession::new(source, Arc::clone(&state));

    if config.autostart()
        && let Err(err) = session.start(detector_config)
    {
        tracing::warn!(error = %err, "Autostart failed, waiting for start request");
    }

    let prostrations = match state.read() {
        Ok(guard) => guard.subscribe_prostrations(),
        Err(_) => return Err("state lock poisoned during startup".into()),
    };
    tokio::spawn(announce_prostrations(prostrations));

    let session = Arc::new(Mutex::new(session));
    let app = api::router(ApiState {
        state: Arc::clone(&state),
        session: Arc::clone(&session),
        detector_config,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the sensor subscription before exiting.
    match session.lock() {
        Ok(mut session) => session.stop()?,
        Err(_) => tracing::warn!("Session lock poisoned during shutdown"),
    }
    tracing::info!("sujood-counter stopped");
    Ok(())
}

fn build_sample_source(
    config: &config::Config,
) -> Result<Box<dyn SampleSource + Send>, Box<dyn std::error::Error>> {
    let interval = config.poll_interval();
    match config.sensor_driver() {
        SensorDriverKind::Iio => {
            tracing::info!(path = %config.iio_path().display(), "Using IIO light sensor");
            let factory = IioLightFactory::new(config.iio_path());
            Ok(Box::new(PollingSampleSource::new(factory, interval)))
        }
        SensorDriverKind::Bh1750 => build_bh1750_source(config, interval),
    }
}

#[cfg(target_os = "linux")]
fn build_bh1750_source(
    config: &config::Config,
    interval: std::time::Duration,
) -> Result<Box<dyn SampleSource + Send>, Box<dyn std::error::Error>> {
    use sujood_counter::sensor::bh1750::Bh1750Factory;

    tracing::info!(
        bus = config.i2c_bus(),
        address = format_args!("{:#04x}", config.i2c_address()),
        "Using BH1750 light sensor"
    );
    let factory = Bh1750Factory::new(config.i2c_bus(), config.i2c_address());
    Ok(Box::new(PollingSampleSource::new(factory, interval)))
}

#[cfg(not(target_os = "linux"))]
fn build_bh1750_source(
    _config: &config::Config,
    _interval: std::time::Duration,
) -> Result<Box<dyn SampleSource + Send>, Box<dyn std::error::Error>> {
    Err("BH1750 driver requires Linux/Raspberry Pi".into())
}

/// Feedback hook: every counted prostration lands here.
async fn announce_prostrations(
    mut prostrations: watch::Receiver<Option<sujood_counter::state::ProstrationRecord>>,
) {
    while prostrations.changed().await.is_ok() {
        let latest = *prostrations.borrow_and_update();
        if let Some(record) = latest {
            tracing::info!(
                prostrations = record.prostration_count,
                bows = record.bow_count,
                duration_s = format_args!("{:.1}", record.duration.as_secs_f64()),
                "Sujood detected"
            );
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
