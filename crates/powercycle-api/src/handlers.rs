//! REST API handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use powercycle_core::{CommandState, DeviceOutcome, is_valid_device_id};
use powercycle_ledger::Device;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// A ledger row joined with the cached command, if still live.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub command: Option<CommandState>,
}

// ── Devices ────────────────────────────────────────────────────

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<ApiState>) -> impl IntoResponse {
    let devices = match state.ledger.list_ordered_by_fairness() {
        Ok(devices) => devices,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let cached = state
        .cache
        .get_many(devices.iter().map(|d| d.id.as_str()))
        .await;
    let views: Vec<DeviceView> = devices
        .into_iter()
        .map(|device| DeviceView {
            command: cached.get(&device.id).copied(),
            device,
        })
        .collect();
    ApiResponse::ok(views).into_response()
}

/// GET /api/v1/devices/{id}
pub async fn get_device(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.ledger.get(&id) {
        Ok(Some(device)) => {
            let command = state.cache.get(&id).await;
            ApiResponse::ok(DeviceView { device, command }).into_response()
        }
        Ok(None) => error_response("device not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/devices/{id}
///
/// Idempotent: `201` when the device is new, `200` when it already
/// existed. History is never reset.
pub async fn register_device(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if !is_valid_device_id(&id) {
        return error_response("invalid device id", StatusCode::BAD_REQUEST).into_response();
    }

    let created = match state.ledger.record_observed_if_absent(&id) {
        Ok(created) => created,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    if created {
        info!(device = %id, "device registered");
    }

    match state.ledger.get(&id) {
        Ok(Some(device)) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, ApiResponse::ok(device)).into_response()
        }
        Ok(None) => error_response("device vanished after registration", StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Dashboard ──────────────────────────────────────────────────

/// Status summary of the latest tick. Tick fields are null until the
/// first tick completes.
#[derive(Debug, Serialize)]
pub struct DashboardStatus {
    pub last_tick: Option<DateTime<Utc>>,
    pub frequency_hz: Option<f64>,
    pub stability_ok: Option<bool>,
    pub available_power_kw: Option<f64>,
    pub active_devices: Vec<String>,
    pub active_count: usize,
    pub max_active: Option<usize>,
    pub device_count: Option<usize>,
    pub supply_shortfall: Option<bool>,
    /// Null until a tick completes or when connectivity is not tracked.
    pub network_up: Option<bool>,
    pub alerts: Vec<String>,
    pub ticks_total: u64,
}

/// GET /dashboard
pub async fn dashboard(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot().await;
    let status = match &snapshot.latest {
        Some(report) => DashboardStatus {
            last_tick: Some(report.at),
            frequency_hz: Some(report.stability_value),
            stability_ok: Some(report.stability_ok),
            available_power_kw: Some(report.available_power_kw),
            active_devices: report
                .outcome
                .outcomes
                .iter()
                .filter(|o| {
                    matches!(
                        o.outcome,
                        DeviceOutcome::MarkedActive
                            | DeviceOutcome::CommandSkipped(CommandState::Active)
                    )
                })
                .map(|o| o.device.clone())
                .collect(),
            active_count: report.active_count(),
            max_active: Some(report.outcome.max_active),
            device_count: Some(report.outcome.device_count),
            supply_shortfall: Some(report.supply_shortfall),
            network_up: report.network_up,
            alerts: report.alerts.clone(),
            ticks_total: snapshot.ticks_total,
        },
        None => DashboardStatus {
            last_tick: None,
            frequency_hz: None,
            stability_ok: None,
            available_power_kw: None,
            active_devices: Vec::new(),
            active_count: 0,
            max_active: None,
            device_count: None,
            supply_shortfall: None,
            network_up: None,
            alerts: Vec::new(),
            ticks_total: 0,
        },
    };
    ApiResponse::ok(status)
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = powercycle_metrics::render_prometheus(&state.metrics.snapshot().await);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
