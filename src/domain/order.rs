use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// A candidate order before risk/approval review. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProposal {
    pub id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    /// Limit price; `None` for market orders without a reference price
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    pub reason: String,
    /// Higher is more urgent
    pub priority: i32,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl OrderProposal {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: u64, price: Option<Decimal>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            order_type: if price.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            reason: String::new(),
            priority: 0,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Notional value: quantity x price, zero when no price is attached.
    /// Saturates at `Decimal::MAX`.
    pub fn order_value(&self) -> Decimal {
        self.price
            .map(|p| Decimal::from(self.quantity).saturating_mul(p))
            .unwrap_or(Decimal::ZERO)
    }

    /// Like `order_value`, but `None` when the product is out of range
    pub fn checked_order_value(&self) -> Option<Decimal> {
        match self.price {
            Some(p) => Decimal::from(self.quantity).checked_mul(p),
            None => Some(Decimal::ZERO),
        }
    }
}

/// Verdict of the approval authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    Pending,
    RequiresReview,
}

impl DecisionStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, DecisionStatus::Approved)
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionStatus::Approved => write!(f, "APPROVED"),
            DecisionStatus::Rejected => write!(f, "REJECTED"),
            DecisionStatus::Pending => write!(f, "PENDING"),
            DecisionStatus::RequiresReview => write!(f, "REQUIRES_REVIEW"),
        }
    }
}

/// The authority's decision on exactly one proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDecision {
    pub proposal_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub status: DecisionStatus,
    pub approved_quantity: Option<u64>,
    pub approved_price: Option<Decimal>,
    pub reason: String,
    pub conditions: Vec<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl OrderDecision {
    pub fn new(proposal: &OrderProposal, status: DecisionStatus, reason: impl Into<String>) -> Self {
        Self {
            proposal_id: proposal.id,
            symbol: proposal.symbol.clone(),
            side: proposal.side,
            status,
            approved_quantity: None,
            approved_price: None,
            reason: reason.into(),
            conditions: Vec::new(),
            reviewed_at: Utc::now(),
        }
    }

    pub fn approved(proposal: &OrderProposal) -> Self {
        let mut decision = Self::new(proposal, DecisionStatus::Approved, "All checks passed");
        decision.approved_quantity = Some(proposal.quantity);
        decision.approved_price = proposal.price;
        decision
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Terminal state of a broker submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Filled,
    Failed,
}

/// Outcome of sending an approved proposal to the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecution {
    pub proposal_id: Uuid,
    pub broker_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Option<Decimal>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl OrderExecution {
    pub fn is_filled(&self) -> bool {
        self.status == ExecutionStatus::Filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_value() {
        let proposal = OrderProposal::new("005930", OrderSide::Buy, 200, Some(dec!(50000)));
        assert_eq!(proposal.order_value(), dec!(10000000));
        assert_eq!(proposal.order_type, OrderType::Limit);

        let market = OrderProposal::new("005930", OrderSide::Sell, 10, None);
        assert_eq!(market.order_value(), Decimal::ZERO);
        assert_eq!(market.order_type, OrderType::Market);
    }

    #[test]
    fn test_approved_decision_echoes_proposal() {
        let proposal = OrderProposal::new("000660", OrderSide::Buy, 30, Some(dec!(120000)));
        let decision = OrderDecision::approved(&proposal);
        assert_eq!(decision.status, DecisionStatus::Approved);
        assert_eq!(decision.approved_quantity, Some(30));
        assert_eq!(decision.approved_price, Some(dec!(120000)));
        assert_eq!(decision.proposal_id, proposal.id);
    }

    #[test]
    fn test_decision_status_serialization() {
        let json = serde_json::to_string(&DecisionStatus::RequiresReview).unwrap();
        assert_eq!(json, "\"REQUIRES_REVIEW\"");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }
}
