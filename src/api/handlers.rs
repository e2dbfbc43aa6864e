use crate::api::ApiState;
use crate::api::responses::{
    CountsResponse, ErrorCode, ErrorResponse, HealthResponse, HealthStatus, SessionResponse,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const SENSOR_UNAVAILABLE_MESSAGE: &str = "Light sensor unavailable";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum JsonResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for JsonResponse<T> {
    fn into_response(self) -> Response {
        match self {
            JsonResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            JsonResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    Reset,
}

impl SessionCommand {
    fn route(self) -> &'static str {
        match self {
            SessionCommand::Start => "/api/session/start",
            SessionCommand::Stop => "/api/session/stop",
            SessionCommand::Reset => "/api/session/reset",
        }
    }
}

pub async fn get_counts(State(api): State<ApiState>) -> impl IntoResponse {
    build_counts_response(api.state, SystemTime::now())
}

pub async fn get_health(State(api): State<ApiState>) -> impl IntoResponse {
    build_health_response(api.state, SystemTime::now())
}

pub async fn post_start(State(api): State<ApiState>) -> impl IntoResponse {
    run_session_command_blocking(api, SessionCommand::Start).await
}

pub async fn post_stop(State(api): State<ApiState>) -> impl IntoResponse {
    run_session_command_blocking(api, SessionCommand::Stop).await
}

pub async fn post_reset(State(api): State<ApiState>) -> impl IntoResponse {
    run_session_command_blocking(api, SessionCommand::Reset).await
}

/// Session commands may join a sensor polling thread, so they run off the
/// async workers.
async fn run_session_command_blocking(
    api: ApiState,
    command: SessionCommand,
) -> JsonResponse<SessionResponse> {
    let task = tokio::task::spawn_blocking(move || {
        run_session_command(&api, command, SystemTime::now())
    });
    match task.await {
        Ok(response) => response,
        Err(err) => internal_error(command.route(), &format!("session task failed: {err}")),
    }
}

fn build_counts_response(
    state: Arc<RwLock<AppState>>,
    now: SystemTime,
) -> JsonResponse<CountsResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/counts", "state lock poisoned while reading counts");
        }
    };
    let running = guard.running();
    let counts = *guard.counts();
    let lux = guard.lux().map(|reading| reading.lux);
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/counts", "timestamp formatting failure"),
    };

    JsonResponse::Success(CountsResponse {
        running,
        prostration_count: counts.prostration_count,
        bow_count: counts.bow_count,
        last_prostration_seconds: counts.last_event_duration.map(|d| d.as_secs_f64()),
        lux,
        timestamp,
    })
}

fn build_health_response(
    state: Arc<RwLock<AppState>>,
    now: SystemTime,
) -> JsonResponse<HealthResponse> {
    let running = match state.read() {
        Ok(guard) => guard.running(),
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading status");
        }
    };

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/health", "timestamp formatting failure"),
    };

    let status = if running {
        HealthStatus::Running
    } else {
        HealthStatus::Stopped
    };
    JsonResponse::Success(HealthResponse { status, timestamp })
}

fn run_session_command(
    api: &ApiState,
    command: SessionCommand,
    now: SystemTime,
) -> JsonResponse<SessionResponse> {
    let route = command.route();
    let mut session = match api.session.lock() {
        Ok(session) => session,
        Err(_) => return internal_error(route, "session lock poisoned"),
    };

    let result = match command {
        SessionCommand::Start => session.start(api.detector_config),
        SessionCommand::Stop => session.stop(),
        SessionCommand::Reset => session.reset(),
    };
    if let Err(err) = result {
        return session_error_response(command, &err, now);
    }

    let running = session.is_running();
    let counts = match session.snapshot() {
        Ok(counts) => counts,
        Err(err) => return internal_error(route, &err.to_string()),
    };
    drop(session);

    match format_timestamp(now) {
        Ok(timestamp) => JsonResponse::Success(SessionResponse {
            running,
            prostration_count: counts.prostration_count,
            bow_count: counts.bow_count,
            timestamp,
        }),
        Err(_) => internal_error(route, "timestamp formatting failure"),
    }
}

fn session_error_response<T>(
    command: SessionCommand,
    err: &AppError,
    now: SystemTime,
) -> JsonResponse<T> {
    let route = command.route();
    match (command, err) {
        (SessionCommand::Start, AppError::Sensor(_) | AppError::I2c(_)) => {
            warn!(route = route, error = %err, "Light sensor refused session start");
            sensor_unavailable_response(now)
        }
        _ => internal_error(route, &format!("session command failed: {err}")),
    }
}

fn sensor_unavailable_response<T>(now: SystemTime) -> JsonResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => JsonResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorResponse {
                error_code: ErrorCode::SensorUnavailable,
                error_message: SENSOR_UNAVAILABLE_MESSAGE.to_string(),
                timestamp,
            },
        },
        Err(_) => internal_error("/api/session/start", "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> JsonResponse<T> {
    error!(route = route, message = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    JsonResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorConfig, Sample};
    use crate::session::PrayerSession;
    use crate::sensor::mock::ManualSampleSource;
    use crate::state::{CountSnapshot, LuxReading};
    use std::sync::Mutex;
    use std::time::{Duration, Instant, UNIX_EPOCH};

    fn api_with(source: &ManualSampleSource) -> ApiState {
        let state = Arc::new(RwLock::new(AppState::new()));
        let session = PrayerSession::new(Box::new(source.clone()), Arc::clone(&state));
        ApiState {
            state,
            session: Arc::new(Mutex::new(session)),
            detector_config: DetectorConfig::default(),
        }
    }

    fn poison(state: &Arc<RwLock<AppState>>) {
        let state_for_thread = Arc::clone(state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();
    }

    #[test]
    fn counts_handler_reports_snapshot() {
        let mut app_state = AppState::new();
        app_state.set_counts(CountSnapshot {
            prostration_count: 5,
            bow_count: 2,
            last_event_duration: Some(Duration::from_millis(1500)),
        });
        app_state.set_lux(LuxReading {
            lux: 12.0,
            timestamp: UNIX_EPOCH,
        });
        let state = Arc::new(RwLock::new(app_state));

        let response = build_counts_response(state, UNIX_EPOCH + Duration::from_secs(1));

        match response {
            JsonResponse::Success(body) => {
                assert!(!body.running);
                assert_eq!(body.prostration_count, 5);
                assert_eq!(body.bow_count, 2);
                assert_eq!(body.last_prostration_seconds, Some(1.5));
                assert_eq!(body.lux, Some(12.0));
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            JsonResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn counts_handler_returns_internal_error_when_lock_poisoned() {
        let state = Arc::new(RwLock::new(AppState::new()));
        poison(&state);

        let response = build_counts_response(state, UNIX_EPOCH);

        match response {
            JsonResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
            }
            JsonResponse::Success(_) => panic!("expected internal error response"),
        }
    }

    #[test]
    fn health_handler_reflects_running_flag() {
        let mut app_state = AppState::new();
        app_state.set_running(true);
        let state = Arc::new(RwLock::new(app_state));

        match build_health_response(state, UNIX_EPOCH) {
            JsonResponse::Success(body) => assert_eq!(body.status, HealthStatus::Running),
            JsonResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }
    }

    #[test]
    fn start_then_samples_show_up_in_session_response() {
        let source = ManualSampleSource::new();
        let api = api_with(&source);

        match run_session_command(&api, SessionCommand::Start, UNIX_EPOCH) {
            JsonResponse::Success(body) => assert!(body.running),
            JsonResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }

        let base = Instant::now();
        source.push(Sample::new(10.0, base));
        source.push(Sample::new(10.0, base + Duration::from_millis(650)));

        match run_session_command(&api, SessionCommand::Stop, UNIX_EPOCH) {
            JsonResponse::Success(body) => {
                assert!(!body.running);
                assert_eq!(body.prostration_count, 1);
                assert_eq!(body.bow_count, 0);
            }
            JsonResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }

        match run_session_command(&api, SessionCommand::Reset, UNIX_EPOCH) {
            JsonResponse::Success(body) => assert_eq!(body.prostration_count, 0),
            JsonResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }
    }

    #[test]
    fn sensor_errors_outside_start_are_internal_errors() {
        let err = AppError::Sensor("bus glitch".to_string());

        let response: JsonResponse<SessionResponse> =
            session_error_response(SessionCommand::Stop, &err, UNIX_EPOCH);

        match response {
            JsonResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
            }
            JsonResponse::Success(_) => panic!("expected internal error response"),
        }
    }

    #[tokio::test]
    async fn session_routes_run_commands_on_blocking_pool() {
        let source = ManualSampleSource::new();
        let api = api_with(&source);

        let started = post_start(State(api.clone())).await.into_response();
        assert_eq!(started.status(), StatusCode::OK);
        assert_eq!(source.subscriber_count(), 1);

        let stopped = post_stop(State(api.clone())).await.into_response();
        assert_eq!(stopped.status(), StatusCode::OK);
        assert_eq!(source.subscriber_count(), 0);

        let reset = post_reset(State(api)).await.into_response();
        assert_eq!(reset.status(), StatusCode::OK);
    }

    #[test]
    fn start_returns_service_unavailable_without_sensor() {
        let api = api_with(&ManualSampleSource::unavailable());

        match run_session_command(&api, SessionCommand::Start, UNIX_EPOCH) {
            JsonResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::SensorUnavailable);
            }
            JsonResponse::Success(_) => panic!("expected sensor unavailable response"),
        }
    }
}
