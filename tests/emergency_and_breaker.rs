use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use tradedesk::agents::PortfolioSizer;
use tradedesk::config::AppConfig;
use tradedesk::coordinator::{DeskAdapters, MainCoordinator, SystemState};
use tradedesk::domain::{DecisionStatus, OrderProposal, OrderSide};
use tradedesk::EmergencyLevel;

async fn running() -> Arc<MainCoordinator> {
    let mut config = AppConfig::default();
    config.coordinator.auto_start_cycle = false;
    config.collector.scheduler_enabled = false;
    let coordinator = MainCoordinator::from_config(&config, DeskAdapters::default()).await;
    coordinator.initialize().await.unwrap();
    coordinator.start().await.unwrap();
    coordinator
}

/// A breaker trip on the risk guard raises the authority to Medium through
/// the coordinator's wiring; the desk keeps running.
#[tokio::test]
async fn breaker_trip_escalates_emergency_level() {
    let coordinator = running().await;
    let risk = &coordinator.components().risk;

    // 600,000 loss against the 1,000,000 reference is past the 5% threshold
    risk.update_daily_pnl(dec!(-600000), dec!(0)).await;
    assert!(risk.is_circuit_breaker_triggered().await);

    let status = coordinator.get_status().await;
    assert!(status.circuit_breaker_triggered);
    assert_eq!(status.emergency_level, EmergencyLevel::Medium);
    assert_eq!(status.state, SystemState::Running);

    coordinator.stop().await.unwrap();
}

/// Critical rejects everything and stops the desk; it stays Critical until
/// explicitly lowered.
#[tokio::test]
async fn critical_emergency_rejects_and_stops() {
    let coordinator = running().await;
    coordinator
        .trigger_emergency(EmergencyLevel::Critical, "exchange outage")
        .await
        .unwrap();
    assert_eq!(coordinator.state().await, SystemState::Initializing);

    let authority = &coordinator.components().authority;
    for (side, quantity, price) in [
        (OrderSide::Buy, 1, dec!(1)),
        (OrderSide::Sell, 10, dec!(70000)),
    ] {
        let proposal = OrderProposal::new("005930", side, quantity, Some(price));
        let decision = authority.review_order(&proposal).await;
        assert_eq!(decision.status, DecisionStatus::Rejected);
    }

    // nothing auto-clears it
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(authority.emergency_level().await, EmergencyLevel::Critical);

    authority.set_emergency(EmergencyLevel::None, "all clear").await;
    assert!(!authority.is_halted());

    // restartable after the reset
    coordinator.start().await.unwrap();
    assert_eq!(coordinator.state().await, SystemState::Running);
    coordinator.stop().await.unwrap();
}

/// Fills keep the portfolio totals consistent.
#[tokio::test]
async fn fills_keep_portfolio_invariants() {
    let coordinator = running().await;
    let portfolio = &coordinator.components().portfolio;

    let buy = OrderProposal::new("005930", OrderSide::Buy, 50, Some(dec!(70000)));
    assert!(portfolio.execute_order(&buy).await.unwrap().is_applied());
    let sell = OrderProposal::new("005930", OrderSide::Sell, 20, Some(dec!(72000)));
    let outcome = portfolio.execute_order(&sell).await.unwrap();
    assert_eq!(outcome.realized_pnl(), dec!(40000));

    let snapshot = coordinator.get_portfolio_status().await;
    let position = snapshot.position("005930").unwrap();
    assert_eq!(position.quantity, 30);
    let invested: rust_decimal::Decimal =
        snapshot.positions.values().map(|p| p.market_value).sum();
    assert_eq!(snapshot.total_value, snapshot.cash + invested);

    coordinator.stop().await.unwrap();
}
