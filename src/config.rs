use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::agents::{AnalystConfig, CollectorConfig, PortfolioConfig, StrategistConfig};
use crate::approval::ApprovalConfig;
use crate::coordinator::CoordinatorConfig;
use crate::execution::ExecutionConfig;
use crate::risk::RiskConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub analyst: AnalystConfig,
    #[serde(default)]
    pub strategist: StrategistConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info,tradedesk=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn is_fraction(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= Decimal::ONE
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", default_log_level())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADEDESK_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADEDESK__RISK__MAX_DAILY_TRADES, etc.)
            .add_source(
                Environment::with_prefix("TRADEDESK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate configuration values, reporting every violation
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Coordinator
        if self.coordinator.universe.is_empty() {
            errors.push("coordinator.universe must not be empty".to_string());
        }
        if self.coordinator.max_daily_trades == 0 {
            errors.push("coordinator.max_daily_trades must be positive".to_string());
        }

        // Approval
        if self.approval.max_single_order_value <= Decimal::ZERO {
            errors.push("approval.max_single_order_value must be positive".to_string());
        }
        if self.approval.manual_review_threshold > self.approval.max_single_order_value {
            errors.push(
                "approval.manual_review_threshold should not exceed max_single_order_value"
                    .to_string(),
            );
        }

        // Risk
        for (name, value) in [
            ("max_position_pct", self.risk.max_position_pct),
            ("max_sector_pct", self.risk.max_sector_pct),
            ("max_single_order_pct", self.risk.max_single_order_pct),
            ("max_daily_loss_pct", self.risk.max_daily_loss_pct),
            ("circuit_breaker_loss_pct", self.risk.circuit_breaker_loss_pct),
        ] {
            if !is_fraction(value) {
                errors.push(format!("risk.{name} must be in (0, 1], got {value}"));
            }
        }
        if self.risk.min_cash_reserve_pct < Decimal::ZERO || self.risk.min_cash_reserve_pct >= Decimal::ONE {
            errors.push("risk.min_cash_reserve_pct must be in [0, 1)".to_string());
        }
        if self.risk.reference_portfolio_value <= Decimal::ZERO {
            errors.push("risk.reference_portfolio_value must be positive".to_string());
        }

        // Portfolio
        if self.portfolio.lot_size == 0 {
            errors.push("portfolio.lot_size must be positive".to_string());
        }
        if self.portfolio.initial_cash < Decimal::ZERO {
            errors.push("portfolio.initial_cash must not be negative".to_string());
        }
        if !is_fraction(self.portfolio.max_position_pct) {
            errors.push("portfolio.max_position_pct must be in (0, 1]".to_string());
        }
        if !is_fraction(self.portfolio.cash_usage_pct) {
            errors.push("portfolio.cash_usage_pct must be in (0, 1]".to_string());
        }

        // Collector / execution
        if self.collector.tick_secs == 0 {
            errors.push("collector.tick_secs must be positive".to_string());
        }
        if self.execution.max_attempts == 0 {
            errors.push("execution.max_attempts must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coordinator.universe.len(), 8);
        assert_eq!(config.risk.max_daily_trades, 20);
        assert_eq!(config.approval.manual_review_threshold, dec!(5000000));
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let mut config = AppConfig::default();
        config.coordinator.universe.clear();
        config.risk.max_position_pct = dec!(1.5);
        config.portfolio.lot_size = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("universe")));
        assert!(errors.iter().any(|e| e.contains("max_position_pct")));
        assert!(errors.iter().any(|e| e.contains("lot_size")));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/tradedesk-config").unwrap();
        assert_eq!(config.coordinator.max_daily_trades, 10);
        assert_eq!(config.logging.level, "info,tradedesk=debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_renders_as_toml() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[coordinator]"));
        assert!(rendered.contains("[risk]"));
    }
}
