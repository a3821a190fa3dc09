use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // System endpoints
        .route("/api/v1/system/status", get(handlers::get_system_status))
        .route("/api/v1/emergency/stop", post(handlers::emergency_stop))
        // Trading endpoints
        .route("/api/v1/portfolio", get(handlers::get_portfolio))
        .route("/api/v1/signals", get(handlers::get_signals))
        .route("/api/v1/cycle/trigger", post(handlers::trigger_cycle))
        .route("/api/v1/analyze/:symbol", get(handlers::analyze_symbol))
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::coordinator::{DeskAdapters, MainCoordinator, SystemState};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn coordinator() -> Arc<MainCoordinator> {
        let mut config = AppConfig::default();
        config.coordinator.auto_start_cycle = false;
        config.collector.scheduler_enabled = false;
        let coordinator = MainCoordinator::from_config(&config, DeskAdapters::default()).await;
        coordinator.initialize().await.unwrap();
        coordinator
    }

    async fn call(router: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_reports_state() {
        let router = create_router(AppState::new(coordinator().await));
        let (status, body) = call(router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "INITIALIZING");
        assert!(body["last_cycle"].is_null());
    }

    #[tokio::test]
    async fn test_cycle_trigger_requires_running() {
        let coordinator = coordinator().await;
        let router = create_router(AppState::new(Arc::clone(&coordinator)));

        let (status, _) = call(router.clone(), "POST", "/api/v1/cycle/trigger").await;
        assert_eq!(status, StatusCode::CONFLICT);

        coordinator.start().await.unwrap();
        let (status, body) = call(router, "POST", "/api/v1/cycle/trigger").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["success"], true);
        assert_eq!(body["result"]["trades_executed"], 0);
        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_emergency_stop_halts_desk() {
        let coordinator = coordinator().await;
        coordinator.start().await.unwrap();
        let router = create_router(AppState::new(Arc::clone(&coordinator)));

        let (status, _) = call(
            router.clone(),
            "POST",
            "/api/v1/emergency/stop?reason=drill",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(coordinator.state().await, SystemState::Initializing);

        let (_, body) = call(router, "GET", "/api/v1/system/status").await;
        assert_eq!(body["emergency_level"], "CRITICAL");
    }

    #[tokio::test]
    async fn test_portfolio_and_signals_reads() {
        let router = create_router(AppState::new(coordinator().await));

        let (status, body) = call(router.clone(), "GET", "/api/v1/portfolio").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["positions"].as_object().unwrap().is_empty());

        let (status, body) = call(router, "GET", "/api/v1/signals").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["signals"].as_array().unwrap().is_empty());
    }
}
