use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bus::DailyCycleSummary;
use crate::domain::{DecisionStatus, OrderDecision, OrderSide};

/// One trading day's decisions and running notional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub target_trades: usize,
    pub approved_orders: Vec<OrderDecision>,
    pub rejected_orders: Vec<OrderDecision>,
    /// Pending and RequiresReview decisions
    pub held_orders: Vec<OrderDecision>,
    pub total_buy_value: Decimal,
    pub total_sell_value: Decimal,
}

impl DailyPlan {
    pub fn new(date: NaiveDate, target_trades: usize) -> Self {
        Self {
            date,
            target_trades,
            approved_orders: Vec::new(),
            rejected_orders: Vec::new(),
            held_orders: Vec::new(),
            total_buy_value: Decimal::ZERO,
            total_sell_value: Decimal::ZERO,
        }
    }

    pub fn trade_count(&self) -> usize {
        self.approved_orders.len()
    }

    pub fn is_full(&self, max_trades: usize) -> bool {
        self.trade_count() >= max_trades
    }

    pub fn record(&mut self, decision: &OrderDecision, order_value: Decimal) {
        match decision.status {
            DecisionStatus::Approved => {
                match decision.side {
                    OrderSide::Buy => self.total_buy_value += order_value,
                    OrderSide::Sell => self.total_sell_value += order_value,
                }
                self.approved_orders.push(decision.clone());
            }
            DecisionStatus::Rejected => self.rejected_orders.push(decision.clone()),
            DecisionStatus::Pending | DecisionStatus::RequiresReview => {
                self.held_orders.push(decision.clone())
            }
        }
    }

    pub fn summary(&self) -> DailyCycleSummary {
        DailyCycleSummary {
            date: self.date,
            approved_count: self.approved_orders.len(),
            rejected_count: self.rejected_orders.len(),
            held_count: self.held_orders.len(),
            total_buy_value: self.total_buy_value,
            total_sell_value: self.total_sell_value,
        }
    }
}
