use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::broker::{Broker, BrokerFill};
use crate::bus::{Event, EventBus, EventPayload};
use crate::domain::{ExecutionStatus, OrderExecution, OrderProposal};
use crate::error::CollaboratorError;

const SOURCE: &str = "order_executor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Attempts per order, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    100
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

/// Sends approved proposals to the broker and reports the outcome on the bus
pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    bus: Arc<EventBus>,
    config: ExecutionConfig,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn Broker>, bus: Arc<EventBus>, config: ExecutionConfig) -> Self {
        Self { broker, bus, config }
    }

    /// Place one order. Transient broker errors are retried with exponential
    /// backoff; anything else fails the order immediately. Never errors:
    /// failures come back as a `Failed` execution and an `order_failed` event.
    pub async fn execute(&self, proposal: &OrderProposal, correlation_id: Option<Uuid>) -> OrderExecution {
        let mut attempts = 0;

        let result = loop {
            attempts += 1;
            match self.broker.place_order(proposal).await {
                Ok(fill) => break Ok(fill),
                Err(e) if e.is_transient() && attempts < self.config.max_attempts => {
                    warn!(
                        "Order attempt {} for {} failed: {}. Retrying...",
                        attempts, proposal.symbol, e
                    );
                    sleep(backoff(self.config.retry_base_ms, attempts)).await;
                }
                Err(e) => break Err(e),
            }
        };

        let (execution, payload) = match result {
            Ok(fill) => {
                let execution = filled(proposal, fill);
                info!(
                    "Order {} executed: {} {} x{} @ {:?}",
                    execution.broker_order_id.as_deref().unwrap_or("-"),
                    execution.side,
                    execution.symbol,
                    execution.quantity,
                    execution.price
                );
                (execution.clone(), EventPayload::OrderExecuted(execution))
            }
            Err(e) => {
                error!(
                    "Order for {} failed after {} attempts: {}",
                    proposal.symbol, attempts, e
                );
                let execution = failed(proposal, &e);
                (execution.clone(), EventPayload::OrderFailed(execution))
            }
        };

        self.bus
            .publish(Event::new(SOURCE, payload).with_correlation(correlation_id))
            .await;
        execution
    }
}

fn filled(proposal: &OrderProposal, fill: BrokerFill) -> OrderExecution {
    OrderExecution {
        proposal_id: proposal.id,
        broker_order_id: Some(fill.broker_order_id),
        symbol: proposal.symbol.clone(),
        side: proposal.side,
        quantity: fill.filled_quantity,
        price: fill.fill_price.or(proposal.price),
        status: ExecutionStatus::Filled,
        error: None,
        executed_at: Utc::now(),
    }
}

/// Exponential delay before retry `attempt`, saturating at `u64::MAX` ms
fn backoff(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

fn failed(proposal: &OrderProposal, error: &CollaboratorError) -> OrderExecution {
    OrderExecution {
        proposal_id: proposal.id,
        broker_order_id: None,
        symbol: proposal.symbol.clone(),
        side: proposal.side,
        quantity: proposal.quantity,
        price: proposal.price,
        status: ExecutionStatus::Failed,
        error: Some(error.to_string()),
        executed_at: Utc::now(),
    }
}
