//! Portfolio Manager - position sizing, fills and rebalancing
//!
//! Owns the [`Portfolio`]. Every mutation goes through this agent and is
//! followed by a `portfolio_updated` event.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::{Agent, AgentStatus, PortfolioSizer};
use crate::bus::{Event, EventBus, EventPayload};
use crate::domain::{
    FillOutcome, OrderProposal, OrderSide, Portfolio, Position, SignalDirection, TradeSignal,
};
use crate::error::{CollaboratorError, Result};

const SOURCE: &str = "portfolio_manager";

/// Current-price lookup used for sizing
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> std::result::Result<Decimal, CollaboratorError>;
}

/// Fixed quotes, mostly for paper trading and tests
#[derive(Debug, Default, Clone)]
pub struct StaticQuotes {
    prices: HashMap<String, Decimal>,
}

impl StaticQuotes {
    pub fn new(prices: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            prices: prices.into_iter().collect(),
        }
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn quote(&self, symbol: &str) -> std::result::Result<Decimal, CollaboratorError> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| CollaboratorError::unavailable("static_quotes", format!("no quote for {}", symbol)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
    #[serde(default = "default_lot_size")]
    pub lot_size: u64,
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,
    /// Share of available cash a single buy may use
    #[serde(default = "default_cash_usage_pct")]
    pub cash_usage_pct: Decimal,
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,
    /// Rebalance target weight = max_position_pct x this factor
    #[serde(default = "default_rebalance_target_factor")]
    pub rebalance_target_factor: Decimal,
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: Decimal,
}

fn default_initial_cash() -> Decimal {
    dec!(100000000)
}

fn default_lot_size() -> u64 {
    10
}

fn default_min_order_value() -> Decimal {
    dec!(10000)
}

fn default_cash_usage_pct() -> Decimal {
    dec!(0.8)
}

fn default_max_position_pct() -> Decimal {
    dec!(0.10)
}

fn default_rebalance_target_factor() -> Decimal {
    dec!(0.5)
}

fn default_rebalance_threshold() -> Decimal {
    dec!(0.05)
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            lot_size: default_lot_size(),
            min_order_value: default_min_order_value(),
            cash_usage_pct: default_cash_usage_pct(),
            max_position_pct: default_max_position_pct(),
            rebalance_target_factor: default_rebalance_target_factor(),
            rebalance_threshold: default_rebalance_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioStatus {
    pub running: bool,
    pub total_value: Decimal,
    pub cash: Decimal,
    pub positions: usize,
    pub max_position_pct: Decimal,
}

pub struct PortfolioManager {
    config: PortfolioConfig,
    bus: Arc<EventBus>,
    quotes: Option<Arc<dyn QuoteSource>>,
    portfolio: RwLock<Portfolio>,
    running: AtomicBool,
}

impl PortfolioManager {
    pub fn new(config: PortfolioConfig, bus: Arc<EventBus>) -> Self {
        let portfolio = Portfolio::new(config.initial_cash);
        Self {
            config,
            bus,
            quotes: None,
            portfolio: RwLock::new(portfolio),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_quotes(mut self, quotes: Arc<dyn QuoteSource>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    /// Replace the book, e.g. with positions loaded from the account
    pub async fn load_portfolio(&self, portfolio: Portfolio) {
        *self.portfolio.write().await = portfolio.clone();
        self.publish_update(portfolio).await;
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Mark held positions to the given prices
    pub async fn update_positions(&self, prices: &HashMap<String, Decimal>) -> Portfolio {
        let snapshot = {
            let mut portfolio = self.portfolio.write().await;
            portfolio.mark_prices(prices);
            portfolio.clone()
        };
        debug!("Marked {} prices, total value {}", prices.len(), snapshot.total_value);
        self.publish_update(snapshot.clone()).await;
        snapshot
    }

    pub async fn get_position(&self, symbol: &str) -> Option<Position> {
        self.portfolio.read().await.position(symbol).cloned()
    }

    pub async fn get_status(&self) -> PortfolioStatus {
        let portfolio = self.portfolio.read().await;
        PortfolioStatus {
            running: self.running.load(Ordering::SeqCst),
            total_value: portfolio.total_value,
            cash: portfolio.cash,
            positions: portfolio.positions.len(),
            max_position_pct: self.config.max_position_pct,
        }
    }

    async fn price_for(&self, signal: &TradeSignal) -> Option<Decimal> {
        if let Some(quotes) = &self.quotes {
            match quotes.quote(&signal.symbol).await {
                Ok(price) if price > Decimal::ZERO => return Some(price),
                Ok(price) => warn!("Ignoring non-positive quote {} for {}", price, signal.symbol),
                Err(e) => debug!("Quote unavailable for {}: {}", signal.symbol, e),
            }
        }
        signal.target_price.filter(|p| *p > Decimal::ZERO)
    }

    fn round_to_lot(&self, quantity: u64) -> u64 {
        let lot = self.config.lot_size.max(1);
        quantity - quantity % lot
    }

    async fn evaluate_buy(
        &self,
        signal: &TradeSignal,
        portfolio: &Portfolio,
        budget: Decimal,
    ) -> Option<OrderProposal> {
        let weight = portfolio.weight_of(&signal.symbol);
        let max_pct = self.config.max_position_pct;
        if weight >= max_pct {
            debug!("{} already at max weight {}", signal.symbol, weight);
            return None;
        }

        let strength = Decimal::from_f64_retain(signal.strength).unwrap_or_default();
        let target_value = (portfolio.total_value * (max_pct - weight) * strength)
            .min(budget * self.config.cash_usage_pct);
        if target_value < self.config.min_order_value {
            debug!("{} target value {} below minimum order", signal.symbol, target_value);
            return None;
        }

        let Some(price) = self.price_for(signal).await else {
            warn!("No price for {}, skipping buy", signal.symbol);
            return None;
        };
        let quantity = self.round_to_lot((target_value / price).floor().to_u64().unwrap_or(0));
        if quantity == 0 {
            return None;
        }

        let mut proposal = OrderProposal::new(signal.symbol.clone(), OrderSide::Buy, quantity, Some(price))
            .with_reason(format!("Buy signal: {}", signal.strategy_name))
            .with_priority((signal.strength * 10.0) as i32)
            .with_metadata("strategy", signal.strategy_name.clone());
        if let Some(target) = signal.target_price {
            proposal = proposal.with_metadata("target_price", target.to_string());
        }
        if let Some(stop) = signal.stop_loss_price {
            proposal = proposal.with_metadata("stop_loss", stop.to_string());
        }
        Some(proposal)
    }

    async fn evaluate_sell(&self, signal: &TradeSignal, portfolio: &Portfolio) -> Option<OrderProposal> {
        let position = portfolio.position(&signal.symbol)?;

        // Losing positions are only cut on strong signals
        if position.unrealized_pnl < Decimal::ZERO && signal.strength < 0.8 {
            debug!("Holding losing position {} on weak sell signal", signal.symbol);
            return None;
        }

        let quantity = self.round_to_lot((position.quantity as f64 * signal.strength) as u64);
        if quantity < self.config.lot_size.max(1) {
            return None;
        }

        let price = self
            .price_for(signal)
            .await
            .unwrap_or(position.current_price);

        Some(
            OrderProposal::new(signal.symbol.clone(), OrderSide::Sell, quantity, Some(price))
                .with_reason(format!("Sell signal: {}", signal.strategy_name))
                .with_priority((signal.strength * 10.0) as i32)
                .with_metadata("strategy", signal.strategy_name.clone())
                .with_metadata("unrealized_pnl", position.unrealized_pnl.to_string()),
        )
    }

    async fn publish_update(&self, portfolio: Portfolio) {
        self.bus
            .publish(Event::new(SOURCE, EventPayload::PortfolioUpdated(portfolio)))
            .await;
    }
}

#[async_trait]
impl PortfolioSizer for PortfolioManager {
    /// Size one proposal per actionable signal, highest priority first.
    /// Buys draw down a shared budget so the batch never exceeds the cash on hand.
    async fn generate_order_proposals(
        &self,
        signals: &[TradeSignal],
        available_cash: Decimal,
    ) -> Result<Vec<OrderProposal>> {
        let portfolio = self.portfolio.read().await.clone();
        let mut budget = available_cash.min(portfolio.cash).max(Decimal::ZERO);
        let mut proposals = Vec::new();

        for signal in signals {
            let proposal = match signal.direction {
                SignalDirection::Buy => self.evaluate_buy(signal, &portfolio, budget).await,
                SignalDirection::Sell => self.evaluate_sell(signal, &portfolio).await,
                SignalDirection::Hold => None,
            };
            if let Some(proposal) = proposal {
                if proposal.side == OrderSide::Buy {
                    budget -= proposal.order_value();
                }
                proposals.push(proposal);
            }
        }

        proposals.sort_by(|a, b| b.priority.cmp(&a.priority));
        info!("Generated {} order proposals from {} signals", proposals.len(), signals.len());
        Ok(proposals)
    }

    async fn execute_order(&self, proposal: &OrderProposal) -> Result<FillOutcome> {
        let Some(price) = proposal.price else {
            return Ok(FillOutcome::Skipped {
                reason: "no fill price".to_string(),
            });
        };

        let (outcome, snapshot) = {
            let mut portfolio = self.portfolio.write().await;
            let applied = match proposal.side {
                OrderSide::Buy => portfolio
                    .apply_buy(&proposal.symbol, proposal.quantity, price)
                    .map(|_| Decimal::ZERO),
                OrderSide::Sell => portfolio.apply_sell(&proposal.symbol, proposal.quantity, price),
            };
            match applied {
                Ok(realized_pnl) => (FillOutcome::Applied { realized_pnl }, Some(portfolio.clone())),
                Err(rejection) => (
                    FillOutcome::Skipped {
                        reason: rejection.to_string(),
                    },
                    None,
                ),
            }
        };

        match &snapshot {
            Some(portfolio) => info!(
                "Applied {} {} x{} @ {} (cash {})",
                proposal.side, proposal.symbol, proposal.quantity, price, portfolio.cash
            ),
            None => warn!("Fill for {} not applied: {:?}", proposal.symbol, outcome),
        }
        if let Some(portfolio) = snapshot {
            self.publish_update(portfolio).await;
        }
        Ok(outcome)
    }

    /// Trim positions that drifted above the target weight
    async fn rebalance(&self) -> Result<Vec<OrderProposal>> {
        let portfolio = self.portfolio.read().await.clone();
        let target = self.config.max_position_pct * self.config.rebalance_target_factor;
        let mut proposals = Vec::new();

        for position in portfolio.positions.values() {
            let excess = position.weight - target;
            if excess <= self.config.rebalance_threshold || position.weight.is_zero() {
                continue;
            }
            let raw = (Decimal::from(position.quantity) * excess / position.weight)
                .floor()
                .to_u64()
                .unwrap_or(0);
            let quantity = self.round_to_lot(raw);
            if quantity < self.config.lot_size.max(1) {
                continue;
            }
            proposals.push(
                OrderProposal::new(
                    position.symbol.clone(),
                    OrderSide::Sell,
                    quantity,
                    Some(position.current_price),
                )
                .with_reason("Rebalance: reduce position")
                .with_priority(5),
            );
        }

        if !proposals.is_empty() {
            info!("Rebalance proposes {} trims toward weight {}", proposals.len(), target);
        }
        Ok(proposals)
    }

    async fn portfolio(&self) -> Portfolio {
        self.portfolio.read().await.clone()
    }

    fn into_agent(self: Arc<Self>) -> Arc<dyn Agent> {
        self
    }
}

#[async_trait]
impl Agent for PortfolioManager {
    fn name(&self) -> &str {
        SOURCE
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::from_running(self.running.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let snapshot = self.portfolio.read().await.clone();
        info!(
            "Portfolio Manager started (cash {}, {} positions)",
            snapshot.cash,
            snapshot.positions.len()
        );
        self.publish_update(snapshot).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Portfolio Manager stopped");
        Ok(())
    }
}
