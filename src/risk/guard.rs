//! Risk Guard - standalone pre-trade validator
//!
//! Runs a fixed sequence of checks against an order and the caller's view of
//! the portfolio, and tracks daily P&L to drive the loss circuit breaker.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::circuit_breaker::{BreakerReset, BreakerSnapshot, CircuitBreaker};
use super::types::{DailyLossRecord, RiskCheckReport, RiskCheckResult};
use crate::bus::{CircuitBreakerTrip, Event, EventBus, EventPayload, EventType};
use crate::domain::{OrderSide, Portfolio};

const SOURCE: &str = "risk_guard";

/// Risk limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,
    #[serde(default = "default_max_sector_pct")]
    pub max_sector_pct: Decimal,
    #[serde(default = "default_max_single_order_pct")]
    pub max_single_order_pct: Decimal,
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_min_cash_reserve_pct")]
    pub min_cash_reserve_pct: Decimal,
    #[serde(default = "default_circuit_breaker_enabled")]
    pub circuit_breaker_enabled: bool,
    #[serde(default = "default_circuit_breaker_loss_pct")]
    pub circuit_breaker_loss_pct: Decimal,
    #[serde(default = "default_circuit_breaker_cooldown_minutes")]
    pub circuit_breaker_cooldown_minutes: i64,
    /// Denominator for the breaker loss fraction. Fixed, not the live total.
    #[serde(default = "default_reference_portfolio_value")]
    pub reference_portfolio_value: Decimal,
}

fn default_max_position_pct() -> Decimal {
    Decimal::new(10, 2)
}

fn default_max_sector_pct() -> Decimal {
    Decimal::new(30, 2)
}

fn default_max_single_order_pct() -> Decimal {
    Decimal::new(5, 2)
}

fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(2, 2)
}

fn default_max_daily_trades() -> u32 {
    20
}

fn default_min_cash_reserve_pct() -> Decimal {
    Decimal::new(10, 2)
}

fn default_circuit_breaker_enabled() -> bool {
    true
}

fn default_circuit_breaker_loss_pct() -> Decimal {
    Decimal::new(5, 2)
}

fn default_circuit_breaker_cooldown_minutes() -> i64 {
    60
}

fn default_reference_portfolio_value() -> Decimal {
    Decimal::from(1_000_000)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_pct: default_max_position_pct(),
            max_sector_pct: default_max_sector_pct(),
            max_single_order_pct: default_max_single_order_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_daily_trades: default_max_daily_trades(),
            min_cash_reserve_pct: default_min_cash_reserve_pct(),
            circuit_breaker_enabled: default_circuit_breaker_enabled(),
            circuit_breaker_loss_pct: default_circuit_breaker_loss_pct(),
            circuit_breaker_cooldown_minutes: default_circuit_breaker_cooldown_minutes(),
            reference_portfolio_value: default_reference_portfolio_value(),
        }
    }
}

/// An order as seen by the guard
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCheck<'a> {
    pub symbol: &'a str,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Decimal,
    pub portfolio_total: Decimal,
    /// Current market value per symbol
    pub current_positions: &'a HashMap<String, Decimal>,
}

impl OrderCheck<'_> {
    /// `quantity × price`, `None` when out of range
    pub fn order_value(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.price)
    }
}

fn percent(fraction: Decimal) -> Decimal {
    fraction.saturating_mul(Decimal::ONE_HUNDRED)
}

/// Read-only status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub circuit_breaker: BreakerSnapshot,
    pub daily: DailyLossRecord,
    pub blocked_symbols: Vec<String>,
    pub limits: RiskConfig,
}

pub struct RiskGuard {
    config: RiskConfig,
    bus: Arc<EventBus>,
    breaker: RwLock<CircuitBreaker>,
    daily: RwLock<DailyLossRecord>,
    blocked: RwLock<BTreeSet<String>>,
    sectors: RwLock<HashMap<String, String>>,
}

impl RiskGuard {
    pub fn new(config: RiskConfig, bus: Arc<EventBus>) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker_cooldown_minutes);
        Self {
            config,
            bus,
            breaker: RwLock::new(breaker),
            daily: RwLock::new(DailyLossRecord::new(Utc::now().date_naive())),
            blocked: RwLock::new(BTreeSet::new()),
            sectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Subscribe to approvals (trace) and cycle completion (daily reset)
    pub async fn register(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.bus
            .subscribe_fn(EventType::OrderApproved, "risk_guard.order_approved", |event| async move {
                if let EventPayload::OrderApproved(decision) = &event.payload {
                    debug!(
                        "Risk guard saw approval {} {} x{:?}",
                        decision.side, decision.symbol, decision.approved_quantity
                    );
                }
                Ok(None)
            })
            .await;

        self.bus
            .subscribe_fn(EventType::DailyCycleComplete, "risk_guard.daily_reset", move |_| {
                let weak = weak.clone();
                async move {
                    if let Some(guard) = weak.upgrade() {
                        guard.reset_daily().await;
                    }
                    Ok(None)
                }
            })
            .await;
    }

    pub async fn validate_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u64,
        price: Decimal,
        portfolio_total: Decimal,
        current_positions: &HashMap<String, Decimal>,
    ) -> RiskCheckReport {
        self.validate(&OrderCheck {
            symbol,
            side,
            quantity,
            price,
            portfolio_total,
            current_positions,
        })
        .await
    }

    /// Validate one order. Checks run in a fixed order and the first
    /// non-passing check is returned.
    pub async fn validate(&self, order: &OrderCheck<'_>) -> RiskCheckReport {
        // 1. Circuit breaker
        {
            let breaker = self.breaker.read().await;
            if let Some(triggered_at) = breaker.triggered_at() {
                return RiskCheckReport::new(
                    "circuit_breaker",
                    RiskCheckResult::Blocked,
                    format!("Circuit breaker triggered at {}", triggered_at),
                )
                .with_detail("triggered_at", triggered_at.to_rfc3339());
            }
        }

        // 2. Blocked symbols
        if self.blocked.read().await.contains(order.symbol) {
            return RiskCheckReport::new(
                "blocked_symbol",
                RiskCheckResult::Blocked,
                format!("Symbol {} is blocked", order.symbol),
            );
        }

        // 3. Single order size
        if order.portfolio_total <= Decimal::ZERO {
            return RiskCheckReport::new(
                "single_order_limit",
                RiskCheckResult::Failed,
                "Portfolio total must be positive",
            )
            .with_decimal("portfolio_total", order.portfolio_total);
        }
        let Some((order_value, order_pct)) = order
            .order_value()
            .and_then(|value| Some((value, value.checked_div(order.portfolio_total)?)))
        else {
            return RiskCheckReport::new(
                "single_order_limit",
                RiskCheckResult::Failed,
                "Order value out of range",
            )
            .with_detail("quantity", order.quantity)
            .with_decimal("price", order.price);
        };
        if order_pct > self.config.max_single_order_pct {
            return RiskCheckReport::new(
                "single_order_limit",
                RiskCheckResult::Failed,
                format!(
                    "Order is {:.2}% of portfolio, limit {:.2}%",
                    percent(order_pct),
                    percent(self.config.max_single_order_pct)
                ),
            )
            .with_decimal("order_value", order_value)
            .with_decimal("order_pct", order_pct);
        }

        // 4. Position concentration (buys only)
        if order.side == OrderSide::Buy {
            let current = order
                .current_positions
                .get(order.symbol)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let position_pct = current
                .checked_add(order_value)
                .and_then(|value| value.checked_div(order.portfolio_total))
                .unwrap_or(Decimal::MAX);
            if position_pct > self.config.max_position_pct {
                return RiskCheckReport::new(
                    "position_limit",
                    RiskCheckResult::Failed,
                    format!(
                        "Position would be {:.2}% of portfolio, limit {:.2}%",
                        percent(position_pct),
                        percent(self.config.max_position_pct)
                    ),
                )
                .with_decimal("position_pct", position_pct);
            }
        }

        // 5. Daily trade count
        let daily = self.current_daily().await;
        if daily.trade_count >= self.config.max_daily_trades {
            return RiskCheckReport::new(
                "daily_trade_limit",
                RiskCheckResult::Failed,
                format!(
                    "Daily trade limit reached ({}/{})",
                    daily.trade_count, self.config.max_daily_trades
                ),
            )
            .with_detail("trades_today", daily.trade_count);
        }

        // 6. Cash reserve (buys only)
        if order.side == OrderSide::Buy {
            let invested: Decimal = order.current_positions.values().copied().sum();
            let cash_after = order
                .portfolio_total
                .checked_sub(invested)
                .and_then(|cash| cash.checked_sub(order_value))
                .unwrap_or(Decimal::MIN);
            let min_cash = order.portfolio_total * self.config.min_cash_reserve_pct;
            if cash_after < min_cash {
                return RiskCheckReport::new(
                    "cash_reserve",
                    RiskCheckResult::Failed,
                    format!("Cash after order {} below reserve {}", cash_after, min_cash),
                )
                .with_decimal("cash_after", cash_after)
                .with_decimal("min_cash", min_cash);
            }
        }

        // 7. Daily loss
        let total_pnl = daily.total_pnl();
        if total_pnl < Decimal::ZERO {
            let loss_pct = total_pnl
                .abs()
                .checked_div(order.portfolio_total)
                .unwrap_or(Decimal::MAX);
            if loss_pct > self.config.max_daily_loss_pct {
                return RiskCheckReport::new(
                    "daily_loss_limit",
                    RiskCheckResult::Blocked,
                    format!(
                        "Daily loss {:.2}% exceeds limit {:.2}%",
                        percent(loss_pct),
                        percent(self.config.max_daily_loss_pct)
                    ),
                )
                .with_decimal("daily_pnl", total_pnl);
            }
        }

        RiskCheckReport::new("all_checks", RiskCheckResult::Passed, "All risk checks passed")
            .with_decimal("order_value", order_value)
            .with_decimal("order_pct", order_pct)
            .with_detail("trades_today", daily.trade_count)
    }

    /// Warnings for positions (and sectors) above their concentration limits
    pub async fn check_position_limits(&self, portfolio: &Portfolio) -> Vec<RiskCheckReport> {
        let mut reports = Vec::new();
        let mut sector_weights: HashMap<String, Decimal> = HashMap::new();
        let sectors = self.sectors.read().await;

        for (symbol, position) in &portfolio.positions {
            if position.weight > self.config.max_position_pct {
                reports.push(
                    RiskCheckReport::new(
                        "position_limit",
                        RiskCheckResult::Warning,
                        format!(
                            "{} is {:.2}% of portfolio, limit {:.2}%",
                            symbol,
                            position.weight * Decimal::ONE_HUNDRED,
                            self.config.max_position_pct * Decimal::ONE_HUNDRED
                        ),
                    )
                    .with_detail("symbol", symbol.clone())
                    .with_decimal("weight", position.weight),
                );
            }
            if let Some(sector) = sectors.get(symbol) {
                *sector_weights.entry(sector.clone()).or_default() += position.weight;
            }
        }

        let mut sector_weights: Vec<_> = sector_weights.into_iter().collect();
        sector_weights.sort_by(|a, b| a.0.cmp(&b.0));
        for (sector, weight) in sector_weights {
            if weight > self.config.max_sector_pct {
                reports.push(
                    RiskCheckReport::new(
                        "sector_limit",
                        RiskCheckResult::Warning,
                        format!(
                            "Sector {} is {:.2}% of portfolio, limit {:.2}%",
                            sector,
                            weight * Decimal::ONE_HUNDRED,
                            self.config.max_sector_pct * Decimal::ONE_HUNDRED
                        ),
                    )
                    .with_detail("sector", sector)
                    .with_decimal("weight", weight),
                );
            }
        }
        reports
    }

    /// Record a fill's P&L for today
    pub async fn update_daily_pnl(&self, realized_pnl: Decimal, unrealized_pnl: Decimal) {
        self.update_daily_pnl_on(Utc::now().date_naive(), realized_pnl, unrealized_pnl)
            .await
    }

    /// Record P&L against an explicit date. The record restarts when the
    /// date differs from the one it holds.
    pub async fn update_daily_pnl_on(&self, date: NaiveDate, realized_pnl: Decimal, unrealized_pnl: Decimal) {
        let total_pnl = {
            let mut daily = self.daily.write().await;
            if daily.roll_to(date) {
                info!("Daily risk record rolled to {}", date);
            }
            daily.realized_pnl += realized_pnl;
            daily.unrealized_pnl = unrealized_pnl;
            daily.trade_count += 1;
            daily.total_pnl()
        };

        if !self.config.circuit_breaker_enabled || total_pnl >= Decimal::ZERO {
            return;
        }

        let loss_pct = total_pnl.abs() / self.config.reference_portfolio_value;
        if loss_pct < self.config.circuit_breaker_loss_pct {
            return;
        }

        let trip = {
            let mut breaker = self.breaker.write().await;
            let reason = format!(
                "Daily loss {:.2}% reached threshold {:.2}%",
                loss_pct * Decimal::ONE_HUNDRED,
                self.config.circuit_breaker_loss_pct * Decimal::ONE_HUNDRED
            );
            let now = Utc::now();
            if !breaker.trip(reason.clone(), now) {
                return;
            }
            CircuitBreakerTrip {
                reason,
                loss: total_pnl,
                loss_pct,
                triggered_at: now,
                cooldown_minutes: self.config.circuit_breaker_cooldown_minutes,
            }
        };

        error!("CIRCUIT BREAKER TRIGGERED: {}", trip.reason);
        self.bus
            .publish(Event::new(SOURCE, EventPayload::CircuitBreakerTriggered(trip)))
            .await;
    }

    /// Clear the breaker once its cooldown has elapsed
    pub async fn reset_circuit_breaker(&self) -> BreakerReset {
        let outcome = self.breaker.write().await.try_reset(Utc::now());
        match outcome {
            BreakerReset::Reset => info!("Circuit breaker reset"),
            BreakerReset::CoolingDown { remaining_secs } => {
                warn!("Circuit breaker still cooling down ({}s left)", remaining_secs)
            }
            BreakerReset::NotTriggered => debug!("Circuit breaker reset requested but not triggered"),
        }
        outcome
    }

    pub async fn is_circuit_breaker_triggered(&self) -> bool {
        self.breaker.read().await.is_triggered()
    }

    pub async fn block_symbol(&self, symbol: &str, reason: &str) {
        self.blocked.write().await.insert(symbol.to_string());
        warn!("Blocked symbol {}: {}", symbol, reason);
    }

    pub async fn unblock_symbol(&self, symbol: &str) -> bool {
        let removed = self.blocked.write().await.remove(symbol);
        if removed {
            info!("Unblocked symbol {}", symbol);
        }
        removed
    }

    pub async fn assign_sector(&self, symbol: &str, sector: &str) {
        self.sectors
            .write()
            .await
            .insert(symbol.to_string(), sector.to_string());
    }

    /// Start a fresh record for today
    pub async fn reset_daily(&self) {
        *self.daily.write().await = DailyLossRecord::new(Utc::now().date_naive());
        info!("Daily risk record reset");
    }

    pub async fn daily_record(&self) -> DailyLossRecord {
        self.current_daily().await
    }

    pub async fn get_status(&self) -> RiskStatus {
        RiskStatus {
            circuit_breaker: self.breaker.read().await.snapshot(),
            daily: self.current_daily().await,
            blocked_symbols: self.blocked.read().await.iter().cloned().collect(),
            limits: self.config.clone(),
        }
    }

    async fn current_daily(&self) -> DailyLossRecord {
        let today = Utc::now().date_naive();
        let mut daily = self.daily.read().await.clone();
        daily.roll_to(today);
        daily
    }
}
