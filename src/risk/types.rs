use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of one risk check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskCheckResult {
    Passed,
    Failed,
    Warning,
    Blocked,
}

impl RiskCheckResult {
    pub fn is_passed(&self) -> bool {
        matches!(self, RiskCheckResult::Passed)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, RiskCheckResult::Blocked)
    }
}

impl std::fmt::Display for RiskCheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskCheckResult::Passed => write!(f, "PASSED"),
            RiskCheckResult::Failed => write!(f, "FAILED"),
            RiskCheckResult::Warning => write!(f, "WARNING"),
            RiskCheckResult::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Report produced by a validation call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheckReport {
    pub check_name: String,
    pub result: RiskCheckResult,
    pub message: String,
    pub details: BTreeMap<String, Value>,
}

impl RiskCheckReport {
    pub fn new(check_name: &str, result: RiskCheckResult, message: impl Into<String>) -> Self {
        Self {
            check_name: check_name.to_string(),
            result,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_decimal(self, key: &str, value: Decimal) -> Self {
        self.with_detail(key, value.to_string())
    }
}

/// P&L and trade count for one calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLossRecord {
    pub date: NaiveDate,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub trade_count: u32,
}

impl DailyLossRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            trade_count: 0,
        }
    }

    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }

    /// Start over if `date` is not this record's date
    pub fn roll_to(&mut self, date: NaiveDate) -> bool {
        if self.date != date {
            *self = Self::new(date);
            true
        } else {
            false
        }
    }
}
