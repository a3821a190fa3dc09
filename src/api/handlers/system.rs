use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::api::{state::AppState, types::*};
use crate::approval::EmergencyLevel;
use crate::coordinator::SystemStatus;

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.coordinator.get_status().await;
    Json(HealthResponse {
        status: status.state,
        started_at: status.started_at,
        last_cycle: status.last_cycle.map(|c| c.success),
        uptime_secs: state.uptime_seconds(),
    })
}

/// GET /api/v1/system/status
pub async fn get_system_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(state.coordinator.get_status().await)
}

/// POST /api/v1/emergency/stop
pub async fn emergency_stop(
    State(state): State<AppState>,
    Query(query): Query<EmergencyStopQuery>,
) -> std::result::Result<Json<MessageResponse>, (StatusCode, String)> {
    let reason = query
        .reason
        .unwrap_or_else(|| "Manual emergency stop".to_string());
    warn!("Emergency stop requested via API: {}", reason);

    state
        .coordinator
        .trigger_emergency(EmergencyLevel::Critical, &reason)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(MessageResponse {
        message: "Emergency stop triggered".to_string(),
    }))
}
