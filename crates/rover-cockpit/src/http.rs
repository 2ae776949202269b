//! REST surface under `/api`.
//!
//! Reads reuse the payload builders of the watches, so a `GET` and the
//! matching push carry the same JSON.  Failures are answered with problem
//! details (`{"status", "title", "detail"}`).

use std::net::SocketAddr;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rover_hal::Robot;
use rover_hal::motor::Motor;
use rover_hal::rc::RcReceiver;
use rover_middleware::payloads;
use rover_types::GatewayError;
use rover_types::state::{DriveMode, InputSource, LedAnimation, LedIndicator, Orientation};
use rover_types::update::{
    ActionRequest, InputInterfaceUpdate, InputUpdate, KinematicUpdate, LedUpdate, MotorUpdate,
    RESET_ODOMETER_ACTION, RcUpdate,
};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Problem details
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Problem {
    status: u16,
    title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// A [`GatewayError`] on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(GatewayError::BadRequest(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(GatewayError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title, detail) = match self.0 {
            GatewayError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "Bad request", detail),
            GatewayError::NotFound(detail) => (StatusCode::NOT_FOUND, "Not found", detail),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                other.to_string(),
            ),
        };
        warn!(status = status.as_u16(), %detail, "request failed");
        let problem = Problem {
            status: status.as_u16(),
            title,
            detail: Some(detail),
        };
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(problem),
        )
            .into_response()
    }
}

type ApiResult<T = Json<Value>> = Result<T, ApiError>;

// ────────────────────────────────────────────────────────────────────────────
// Router
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct ApiState {
    robot: Robot,
}

pub fn router(robot: Robot) -> Router {
    Router::new()
        .route("/api/motors", get(motor_control))
        .route("/api/motors/:index", get(get_motor).put(put_motor))
        .route("/api/kinematic", get(get_kinematic).put(put_kinematic))
        .route("/api/kinematic/actions", post(kinematic_action))
        .route("/api/kinematic/drive-modes", get(drive_modes))
        .route("/api/kinematic/orientations", get(orientations))
        .route("/api/leds", get(get_leds).put(put_leds))
        .route("/api/leds/output", get(led_output))
        .route("/api/leds/animations", get(led_animations))
        .route("/api/leds/indicators", get(led_indicators))
        .route("/api/rcreceiver", get(get_rc).put(put_rc))
        .route("/api/rcreceiver/channels", get(rc_channels))
        .route("/api/telemetry/imu", get(imu))
        .route("/api/telemetry/odometer", get(odometer))
        .route("/api/system", get(system))
        .route("/api/system/power", get(power))
        .route("/api/system/network", get(network))
        .route("/api/input", get(get_input).put(put_input))
        .route("/api/input/state", get(get_input_state).put(put_input_state))
        .route("/api/input/sources", get(input_sources))
        .fallback(unknown_resource)
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { robot })
}

async fn unknown_resource() -> ApiError {
    ApiError(GatewayError::NotFound("no such resource".to_string()))
}

// ── Motors ──────────────────────────────────────────────────────────────────

fn motor_at(robot: &Robot, index: Result<Path<usize>, PathRejection>) -> ApiResult<&Motor> {
    let Path(index) = index?;
    robot
        .motor(index)
        .map(|m| &**m)
        .ok_or_else(|| GatewayError::NotFound(format!("motor {index}")).into())
}

async fn motor_control(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::motor_control(&state.robot))
}

async fn get_motor(
    State(state): State<ApiState>,
    index: Result<Path<usize>, PathRejection>,
) -> ApiResult {
    let motor = motor_at(&state.robot, index)?;
    Ok(Json(payloads::motor(motor)))
}

async fn put_motor(
    State(state): State<ApiState>,
    index: Result<Path<usize>, PathRejection>,
    body: Result<Json<MotorUpdate>, JsonRejection>,
) -> ApiResult {
    let motor = motor_at(&state.robot, index)?;
    let Json(update) = body?;
    motor.apply(&update);
    Ok(Json(payloads::motor(motor)))
}

// ── Kinematic ───────────────────────────────────────────────────────────────

async fn get_kinematic(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::kinematic(state.robot.kinematic()))
}

async fn put_kinematic(
    State(state): State<ApiState>,
    body: Result<Json<KinematicUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = body?;
    let kinematic = state.robot.kinematic();
    kinematic.apply(&update);
    Ok(Json(payloads::kinematic(kinematic)))
}

async fn kinematic_action(
    State(state): State<ApiState>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(action) = body?;
    if action.id != RESET_ODOMETER_ACTION {
        return Err(GatewayError::BadRequest(format!("unknown action {:?}", action.id)).into());
    }
    state.robot.reset_odometer();
    info!(action = %action.id, "kinematic action");
    Ok(StatusCode::OK)
}

async fn drive_modes() -> Json<Value> {
    Json(payloads::to_json(&DriveMode::options()))
}

async fn orientations() -> Json<Value> {
    Json(payloads::to_json(&Orientation::options()))
}

// ── LEDs ────────────────────────────────────────────────────────────────────

async fn get_leds(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::leds(state.robot.leds()))
}

async fn put_leds(
    State(state): State<ApiState>,
    body: Result<Json<LedUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = body?;
    let leds = state.robot.leds();
    leds.apply(&update);
    Ok(Json(payloads::leds(leds)))
}

async fn led_output(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::led_output(state.robot.leds()))
}

async fn led_animations() -> Json<Value> {
    Json(payloads::to_json(&LedAnimation::options()))
}

async fn led_indicators() -> Json<Value> {
    Json(payloads::to_json(&LedIndicator::options()))
}

// ── RC receiver ─────────────────────────────────────────────────────────────

fn rc_of(robot: &Robot) -> Option<&RcReceiver> {
    robot.rc().map(|m| &**m)
}

async fn get_rc(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::rc(rc_of(&state.robot)))
}

/// A robot without a receiver has nothing to configure.
async fn put_rc(
    State(state): State<ApiState>,
    body: Result<Json<RcUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = body?;
    let rc = rc_of(&state.robot)
        .ok_or_else(|| GatewayError::NotFound("rc receiver".to_string()))?;
    rc.apply(&update);
    Ok(Json(payloads::rc(Some(rc))))
}

async fn rc_channels(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::rc_channels(rc_of(&state.robot)))
}

// ── Telemetry and system ────────────────────────────────────────────────────

async fn imu(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::imu(state.robot.telemetry()))
}

async fn odometer(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::odometer(state.robot.telemetry()))
}

async fn system(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::system(&state.robot))
}

async fn power(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::power(state.robot.power()))
}

async fn network(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::network(state.robot.network(), false))
}

// ── Input ───────────────────────────────────────────────────────────────────

async fn get_input(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::input(state.robot.input()))
}

async fn put_input(
    State(state): State<ApiState>,
    body: Result<Json<InputUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = body?;
    let input = state.robot.input();
    input.apply(&update)?;
    Ok(Json(payloads::input(input)))
}

async fn get_input_state(State(state): State<ApiState>) -> Json<Value> {
    Json(payloads::input_state(state.robot.input_interface()))
}

async fn put_input_state(
    State(state): State<ApiState>,
    body: Result<Json<InputInterfaceUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = body?;
    let web = state.robot.input_interface();
    web.apply(&update);
    Ok(Json(payloads::input_state(web)))
}

async fn input_sources() -> Json<Value> {
    Json(payloads::to_json(&InputSource::options()))
}

// ────────────────────────────────────────────────────────────────────────────
// ApiServer
// ────────────────────────────────────────────────────────────────────────────

pub struct ApiServer {
    robot: Robot,
    listener: TcpListener,
}

impl ApiServer {
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the listener cannot bind.
    pub async fn bind(addr: SocketAddr, robot: Robot) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Transport(format!("api server bind on {addr}: {e}")))?;
        Ok(Self { robot, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        self.listener
            .local_addr()
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    /// Serve until `shutdown` is cancelled, letting in-flight requests finish.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        let addr = self.local_addr()?;
        info!(%addr, "api server listening");
        axum::serve(self.listener, router(self.robot))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        info!(%addr, "api server stopped");
        Ok(())
    }
}
