//! Coordinator Configuration

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Configuration for the main coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// UTC time of the daily cycle
    pub cycle_time: NaiveTime,
    /// Run the daily-cycle scheduler after `start()`
    pub auto_start_cycle: bool,
    /// Proposals submitted per daily cycle
    pub max_daily_trades: usize,
    /// Rebalance proposals submitted per daily cycle
    pub max_rebalance_orders: usize,
    /// Proposals submitted per reactive trade signal
    pub max_reactive_orders: usize,
    /// Recent errors kept for status reads
    pub max_recent_errors: usize,
    /// Symbols covered by the daily cycle
    pub universe: Vec<String>,
    /// Run `RiskGuard::validate_order` before the approval authority
    pub pre_trade_risk_check: bool,
    /// Per-agent start/stop timeout
    pub agent_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cycle_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            auto_start_cycle: true,
            max_daily_trades: 10,
            max_rebalance_orders: 5,
            max_reactive_orders: 3,
            max_recent_errors: 10,
            universe: [
                "005930", // Samsung Electronics
                "000660", // SK hynix
                "035420", // NAVER
                "035720", // Kakao
                "005380", // Hyundai Motor
                "051910", // LG Chem
                "006400", // Samsung SDI
                "068270", // Celltrion
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            pre_trade_risk_check: false,
            agent_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"max_daily_trades": 4, "universe": ["005930"]}"#).unwrap();
        assert_eq!(config.max_daily_trades, 4);
        assert_eq!(config.universe, vec!["005930"]);
        assert_eq!(config.max_rebalance_orders, 5);
        assert!(config.auto_start_cycle);
        assert!(!config.pre_trade_risk_check);
    }
}
