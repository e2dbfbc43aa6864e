use crate::detector::DetectorConfig;
use crate::session::PrayerSession;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::{Arc, Mutex, RwLock};

pub mod handlers;
pub mod responses;

#[derive(Clone)]
pub struct ApiState {
    pub state: Arc<RwLock<AppState>>,
    pub session: Arc<Mutex<PrayerSession>>,
    /// Calibration applied on every start request.
    pub detector_config: DetectorConfig,
}

pub fn router(api_state: ApiState) -> Router {
    Router::new()
        .route("/api/counts", get(handlers::get_counts))
        .route("/api/health", get(handlers::get_health))
        .route("/api/session/start", post(handlers::post_start))
        .route("/api/session/stop", post(handlers::post_stop))
        .route("/api/session/reset", post(handlers::post_reset))
        .with_state(api_state)
}
