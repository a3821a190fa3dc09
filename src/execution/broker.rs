use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::domain::OrderProposal;
use crate::error::CollaboratorError;

/// Broker acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerFill {
    pub broker_order_id: String,
    pub filled_quantity: u64,
    pub fill_price: Option<Decimal>,
}

/// Order placement seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_order(&self, proposal: &OrderProposal) -> Result<BrokerFill, CollaboratorError>;
}

/// Fills every priced order in full at the proposal price
#[derive(Debug, Default)]
pub struct PaperBroker {
    next_id: AtomicU64,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn place_order(&self, proposal: &OrderProposal) -> Result<BrokerFill, CollaboratorError> {
        let Some(price) = proposal.price else {
            return Err(CollaboratorError::rejected(
                "paper",
                format!("market order for {} has no reference price", proposal.symbol),
            ));
        };
        if proposal.quantity == 0 {
            return Err(CollaboratorError::rejected("paper", "zero quantity"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("[PAPER] {} {} x{} @ {}", proposal.side, proposal.symbol, proposal.quantity, price);
        Ok(BrokerFill {
            broker_order_id: format!("PAPER-{:06}", id),
            filled_quantity: proposal.quantity,
            fill_price: Some(price),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderSide;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_paper_fills_at_proposal_price() {
        let broker = PaperBroker::new();
        let fill = broker
            .place_order(&OrderProposal::new("005930", OrderSide::Buy, 10, Some(dec!(70000))))
            .await
            .unwrap();
        assert_eq!(fill.broker_order_id, "PAPER-000001");
        assert_eq!(fill.fill_price, Some(dec!(70000)));
        assert_eq!(fill.filled_quantity, 10);

        let second = broker
            .place_order(&OrderProposal::new("000660", OrderSide::Sell, 5, Some(dec!(120000))))
            .await
            .unwrap();
        assert_eq!(second.broker_order_id, "PAPER-000002");
    }

    #[tokio::test]
    async fn test_paper_rejects_unpriced_order() {
        let broker = PaperBroker::new();
        let err = broker
            .place_order(&OrderProposal::new("005930", OrderSide::Buy, 10, None))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
