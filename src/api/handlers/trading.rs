use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::{state::AppState, types::*};
use crate::coordinator::SystemState;
use crate::domain::Portfolio;

fn require_running(state: SystemState) -> std::result::Result<(), (StatusCode, String)> {
    if state == SystemState::Running {
        Ok(())
    } else {
        Err((StatusCode::CONFLICT, format!("System not running ({})", state)))
    }
}

/// GET /api/v1/portfolio
pub async fn get_portfolio(State(state): State<AppState>) -> Json<Portfolio> {
    Json(state.coordinator.get_portfolio_status().await)
}

/// GET /api/v1/signals
pub async fn get_signals(State(state): State<AppState>) -> Json<SignalsResponse> {
    Json(SignalsResponse {
        signals: state.coordinator.get_active_signals().await,
    })
}

/// POST /api/v1/cycle/trigger
pub async fn trigger_cycle(
    State(state): State<AppState>,
) -> std::result::Result<Json<CycleTriggerResponse>, (StatusCode, String)> {
    require_running(state.coordinator.state().await)?;
    let result = state.coordinator.run_daily_cycle().await;
    Ok(Json(CycleTriggerResponse {
        message: "Daily cycle triggered".to_string(),
        result,
    }))
}

/// GET /api/v1/analyze/:symbol
pub async fn analyze_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> std::result::Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    require_running(state.coordinator.state().await)?;
    let signal = state.coordinator.trigger_signal_generation(&symbol).await;
    Ok(Json(AnalyzeResponse::from_signal(symbol, signal)))
}
