//! Approval Authority - final say on every order proposal
//!
//! Reviews proposals against the emergency level, the open daily plan and
//! the configured notional limits, records every decision and publishes it.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::emergency::{EmergencyLevel, EmergencyState};
use super::plan::DailyPlan;
use crate::agents::{Agent, AgentStatus};
use crate::bus::{
    DailyCycleOpened, DailyCycleSummary, EmergencyChange, EmergencyHaltNotice, Event, EventBus,
    EventPayload,
};
use crate::domain::{DecisionStatus, OrderDecision, OrderProposal, OrderSide};
use crate::error::Result;

const SOURCE: &str = "approval_authority";

/// Approval limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Approved orders allowed per daily plan
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: usize,
    /// Above this notional an order needs manual review
    #[serde(default = "default_max_single_order_value")]
    pub max_single_order_value: Decimal,
    /// Above this notional an order is parked as pending
    #[serde(default = "default_manual_review_threshold")]
    pub manual_review_threshold: Decimal,
}

fn default_max_daily_trades() -> usize {
    20
}

fn default_max_single_order_value() -> Decimal {
    Decimal::from(10_000_000)
}

fn default_manual_review_threshold() -> Decimal {
    Decimal::from(5_000_000)
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            max_daily_trades: default_max_daily_trades(),
            max_single_order_value: default_max_single_order_value(),
            manual_review_threshold: default_manual_review_threshold(),
        }
    }
}

/// Decide on one proposal. Checks run in a fixed order and the first
/// non-passing check wins.
pub fn decide(
    proposal: &OrderProposal,
    level: EmergencyLevel,
    plan: Option<&DailyPlan>,
    config: &ApprovalConfig,
) -> OrderDecision {
    // 1. Critical emergency rejects everything
    if level.is_critical() {
        return OrderDecision::new(
            proposal,
            DecisionStatus::Rejected,
            "System in critical emergency",
        );
    }

    // 2. Daily trade budget
    if let Some(plan) = plan {
        if plan.is_full(config.max_daily_trades) {
            return OrderDecision::new(
                proposal,
                DecisionStatus::Rejected,
                format!("Daily trade limit reached ({})", config.max_daily_trades),
            );
        }
    }

    let Some(order_value) = proposal.checked_order_value() else {
        return OrderDecision::new(proposal, DecisionStatus::Rejected, "Order value out of range");
    };

    // 3. Hard notional ceiling needs a human
    if order_value > config.max_single_order_value {
        return OrderDecision::new(
            proposal,
            DecisionStatus::RequiresReview,
            "Order value exceeds single order limit",
        )
        .with_conditions(vec![
            "Manual approval required".to_string(),
            format!(
                "Order value {} exceeds limit {}",
                order_value, config.max_single_order_value
            ),
        ]);
    }

    // 4. Large orders wait for review
    if order_value > config.manual_review_threshold {
        return OrderDecision::new(
            proposal,
            DecisionStatus::Pending,
            format!(
                "Order value {} exceeds manual review threshold {}",
                order_value, config.manual_review_threshold
            ),
        );
    }

    // 5. Directional risk
    if proposal.side == OrderSide::Buy && level.blocks_buying() {
        return OrderDecision::new(
            proposal,
            DecisionStatus::Rejected,
            format!("Buying disallowed during {} emergency", level),
        );
    }
    if order_value > config.max_single_order_value {
        return OrderDecision::new(
            proposal,
            DecisionStatus::Rejected,
            format!("Order value {} exceeds limit", order_value),
        );
    }

    // 6. Approved
    OrderDecision::approved(proposal)
}

/// Read-only status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub running: bool,
    pub emergency: EmergencyState,
    pub daily_plan: Option<DailyCycleSummary>,
    pub decisions_recorded: usize,
}

/// Order approval gateway
pub struct ApprovalAuthority {
    config: ApprovalConfig,
    bus: Arc<EventBus>,
    emergency: RwLock<EmergencyState>,
    /// Fast-path mirror of `level == Critical`
    halted: AtomicBool,
    plan: RwLock<Option<DailyPlan>>,
    history: RwLock<Vec<OrderDecision>>,
    running: AtomicBool,
}

impl ApprovalAuthority {
    pub fn new(config: ApprovalConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            emergency: RwLock::new(EmergencyState::default()),
            halted: AtomicBool::new(false),
            plan: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    /// True while the emergency level is Critical
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub async fn emergency_level(&self) -> EmergencyLevel {
        self.emergency.read().await.level
    }

    /// Review a proposal, record the decision and publish it
    pub async fn review_order(&self, proposal: &OrderProposal) -> OrderDecision {
        self.review_with_correlation(proposal, None).await
    }

    pub async fn review_with_correlation(
        &self,
        proposal: &OrderProposal,
        correlation_id: Option<Uuid>,
    ) -> OrderDecision {
        let level = self.emergency.read().await.level;

        // Decide and record under the plan lock so the trade budget cannot be overrun
        let decision = {
            let mut plan = self.plan.write().await;
            let decision = decide(proposal, level, plan.as_ref(), &self.config);
            if let Some(plan) = plan.as_mut() {
                plan.record(&decision, proposal.order_value());
            }
            decision
        };

        self.history.write().await.push(decision.clone());

        if decision.status.is_approved() {
            info!(
                "Approved {} {} x{} @ {:?}",
                proposal.side, proposal.symbol, proposal.quantity, proposal.price
            );
        } else {
            warn!(
                "{} {} {} x{}: {}",
                decision.status, proposal.side, proposal.symbol, proposal.quantity, decision.reason
            );
        }

        let payload = if decision.status.is_approved() {
            EventPayload::OrderApproved(decision.clone())
        } else {
            EventPayload::OrderRejected(decision.clone())
        };
        self.bus
            .publish(Event::new(SOURCE, payload).with_correlation(correlation_id))
            .await;

        decision
    }

    /// Change the emergency level. Always publishes the change; entering
    /// Critical also publishes a halt.
    pub async fn set_emergency(&self, level: EmergencyLevel, reason: &str) {
        let previous = {
            let mut state = self.emergency.write().await;
            let previous = state.level;
            state.level = level;
            state.reason = Some(reason.to_string());
            state.changed_at = Some(Utc::now());
            previous
        };
        self.halted.store(level.is_critical(), Ordering::SeqCst);

        warn!("Emergency level {} -> {}: {}", previous, level, reason);

        self.bus
            .publish(Event::new(
                SOURCE,
                EventPayload::EmergencyLevelChanged(EmergencyChange {
                    from: previous,
                    to: level,
                    reason: reason.to_string(),
                }),
            ))
            .await;

        if level.is_critical() && !previous.is_critical() {
            self.bus
                .publish(Event::new(
                    SOURCE,
                    EventPayload::EmergencyHalt(EmergencyHaltNotice {
                        level,
                        reason: reason.to_string(),
                    }),
                ))
                .await;
        }
    }

    /// Escalate to Medium on a breaker trip, unless already elevated
    pub async fn trigger_circuit_breaker(&self, reason: &str) {
        let level = self.emergency_level().await;
        if level == EmergencyLevel::None {
            self.set_emergency(EmergencyLevel::Medium, &format!("Circuit breaker: {}", reason))
                .await;
        } else {
            debug!("Circuit breaker reported at level {}: {}", level, reason);
        }
    }

    /// Open today's plan, replacing any plan left open
    pub async fn start_daily_cycle(&self, correlation_id: Option<Uuid>) -> DailyCycleOpened {
        let date = Utc::now().date_naive();
        let opened = DailyCycleOpened {
            date,
            max_trades: self.config.max_daily_trades,
        };

        {
            let mut plan = self.plan.write().await;
            if let Some(stale) = plan.as_ref() {
                warn!("Replacing daily plan for {} that was never closed", stale.date);
            }
            *plan = Some(DailyPlan::new(date, self.config.max_daily_trades));
        }
        info!("Daily plan opened for {}", date);

        self.bus
            .publish(
                Event::new(SOURCE, EventPayload::DailyCycleStart(opened.clone()))
                    .with_correlation(correlation_id),
            )
            .await;
        opened
    }

    /// Close the plan and publish its totals
    pub async fn end_daily_cycle(&self, correlation_id: Option<Uuid>) -> Option<DailyCycleSummary> {
        let plan = self.plan.write().await.take()?;
        let summary = plan.summary();
        info!(
            "Daily plan closed for {}: {} approved, {} rejected, {} held, buy {} / sell {}",
            summary.date,
            summary.approved_count,
            summary.rejected_count,
            summary.held_count,
            summary.total_buy_value,
            summary.total_sell_value
        );

        self.bus
            .publish(
                Event::new(SOURCE, EventPayload::DailyCycleComplete(summary.clone()))
                    .with_correlation(correlation_id),
            )
            .await;
        Some(summary)
    }

    pub async fn get_daily_plan(&self) -> Option<DailyPlan> {
        self.plan.read().await.clone()
    }

    /// Most recent `limit` decisions, oldest first
    pub async fn get_order_history(&self, limit: usize) -> Vec<OrderDecision> {
        let history = self.history.read().await;
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub async fn get_status(&self) -> ApprovalStatus {
        ApprovalStatus {
            running: self.running.load(Ordering::SeqCst),
            emergency: self.emergency.read().await.clone(),
            daily_plan: self.plan.read().await.as_ref().map(DailyPlan::summary),
            decisions_recorded: self.history.read().await.len(),
        }
    }
}

#[async_trait]
impl Agent for ApprovalAuthority {
    fn name(&self) -> &str {
        SOURCE
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::from_running(self.running.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Approval authority started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Approval authority stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventType;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn proposal(side: OrderSide, quantity: u64, price: Decimal) -> OrderProposal {
        OrderProposal::new("005930", side, quantity, Some(price))
    }

    fn authority() -> (ApprovalAuthority, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (ApprovalAuthority::new(ApprovalConfig::default(), Arc::clone(&bus)), bus)
    }

    async fn count_topic(bus: &EventBus, topic: EventType) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe_fn(topic, "counter", move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await;
        counter
    }

    #[test]
    fn test_critical_rejects_regardless_of_order() {
        let config = ApprovalConfig::default();
        for (side, qty, price) in [
            (OrderSide::Buy, 1, dec!(1)),
            (OrderSide::Sell, 10, dec!(50000)),
            (OrderSide::Buy, 1_000_000, dec!(100000)),
        ] {
            let decision = decide(&proposal(side, qty, price), EmergencyLevel::Critical, None, &config);
            assert_eq!(decision.status, DecisionStatus::Rejected);
            assert_eq!(decision.reason, "System in critical emergency");
        }
    }

    #[test]
    fn test_out_of_range_value_is_rejected() {
        let config = ApprovalConfig::default();
        let oversized = proposal(OrderSide::Buy, u64::MAX, dec!(100000000000));

        let decision = decide(&oversized, EmergencyLevel::Critical, None, &config);
        assert_eq!(decision.reason, "System in critical emergency");

        let decision = decide(&oversized, EmergencyLevel::None, None, &config);
        assert_eq!(decision.status, DecisionStatus::Rejected);
        assert_eq!(decision.reason, "Order value out of range");
        assert_eq!(oversized.order_value(), Decimal::MAX);
    }

    #[test]
    fn test_over_single_limit_requires_review() {
        let config = ApprovalConfig::default();
        // 300 x 50,000 = 15,000,000 > 10,000,000
        let decision = decide(&proposal(OrderSide::Buy, 300, dec!(50000)), EmergencyLevel::None, None, &config);
        assert_eq!(decision.status, DecisionStatus::RequiresReview);
        assert_eq!(decision.conditions.len(), 2);
        assert!(decision.approved_quantity.is_none());

        // Buying at High still lands in review because the value check runs first
        let decision = decide(&proposal(OrderSide::Buy, 300, dec!(50000)), EmergencyLevel::High, None, &config);
        assert_eq!(decision.status, DecisionStatus::RequiresReview);
    }

    #[test]
    fn test_over_review_threshold_is_pending() {
        let config = ApprovalConfig::default();
        let decision = decide(&proposal(OrderSide::Sell, 120, dec!(50000)), EmergencyLevel::None, None, &config);
        assert_eq!(decision.status, DecisionStatus::Pending);
    }

    #[test]
    fn test_buy_blocked_at_high_but_sell_allowed() {
        let config = ApprovalConfig::default();
        let buy = decide(&proposal(OrderSide::Buy, 10, dec!(50000)), EmergencyLevel::High, None, &config);
        assert_eq!(buy.status, DecisionStatus::Rejected);
        assert!(buy.reason.contains("HIGH"));

        let sell = decide(&proposal(OrderSide::Sell, 10, dec!(50000)), EmergencyLevel::High, None, &config);
        assert_eq!(sell.status, DecisionStatus::Approved);
        assert_eq!(sell.approved_quantity, Some(10));
    }

    #[test]
    fn test_full_plan_rejects() {
        let config = ApprovalConfig {
            max_daily_trades: 1,
            ..Default::default()
        };
        let mut plan = DailyPlan::new(Utc::now().date_naive(), 1);
        let first = proposal(OrderSide::Buy, 10, dec!(50000));
        let approved = decide(&first, EmergencyLevel::None, Some(&plan), &config);
        plan.record(&approved, first.order_value());

        let second = decide(&proposal(OrderSide::Buy, 10, dec!(50000)), EmergencyLevel::None, Some(&plan), &config);
        assert_eq!(second.status, DecisionStatus::Rejected);
        assert!(second.reason.contains("Daily trade limit"));
    }

    #[tokio::test]
    async fn test_review_records_history_plan_and_events() {
        let (authority, bus) = authority();
        let approved = count_topic(&bus, EventType::OrderApproved).await;
        let rejected = count_topic(&bus, EventType::OrderRejected).await;

        authority.start_daily_cycle(None).await;
        authority.review_order(&proposal(OrderSide::Buy, 10, dec!(70000))).await;
        authority.review_order(&proposal(OrderSide::Sell, 5, dec!(80000))).await;
        authority.review_order(&proposal(OrderSide::Buy, 200, dec!(70000))).await;

        let plan = authority.get_daily_plan().await.unwrap();
        assert_eq!(plan.approved_orders.len(), 2);
        assert_eq!(plan.held_orders.len(), 1);
        assert_eq!(plan.total_buy_value, dec!(700000));
        assert_eq!(plan.total_sell_value, dec!(400000));

        assert_eq!(authority.get_order_history(100).await.len(), 3);
        let tail = authority.get_order_history(1).await;
        assert_eq!(tail[0].status, DecisionStatus::RequiresReview);

        assert_eq!(approved.load(Ordering::SeqCst), 2);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_end_daily_cycle_clears_plan() {
        let (authority, bus) = authority();
        let completed = count_topic(&bus, EventType::DailyCycleComplete).await;

        assert!(authority.end_daily_cycle(None).await.is_none());
        authority.start_daily_cycle(None).await;
        authority.review_order(&proposal(OrderSide::Buy, 10, dec!(70000))).await;

        let summary = authority.end_daily_cycle(None).await.unwrap();
        assert_eq!(summary.approved_count, 1);
        assert!(authority.get_daily_plan().await.is_none());
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_emergency_publishes_change_and_halt() {
        let (authority, bus) = authority();
        let changes = count_topic(&bus, EventType::EmergencyLevelChanged).await;
        let halts = count_topic(&bus, EventType::EmergencyHalt).await;

        authority.set_emergency(EmergencyLevel::Low, "volatility").await;
        authority.set_emergency(EmergencyLevel::Critical, "operator stop").await;
        assert!(authority.is_halted());
        authority.set_emergency(EmergencyLevel::Critical, "again").await;

        assert_eq!(changes.load(Ordering::SeqCst), 3);
        assert_eq!(halts.load(Ordering::SeqCst), 1);

        let decision = authority.review_order(&proposal(OrderSide::Sell, 1, dec!(1))).await;
        assert_eq!(decision.status, DecisionStatus::Rejected);

        authority.set_emergency(EmergencyLevel::None, "operator reset").await;
        assert!(!authority.is_halted());
        let decision = authority.review_order(&proposal(OrderSide::Sell, 1, dec!(1))).await;
        assert_eq!(decision.status, DecisionStatus::Approved);
    }

    #[tokio::test]
    async fn test_circuit_breaker_escalates_only_from_none() {
        let (authority, _bus) = authority();
        authority.trigger_circuit_breaker("daily loss").await;
        assert_eq!(authority.emergency_level().await, EmergencyLevel::Medium);

        authority.set_emergency(EmergencyLevel::High, "manual").await;
        authority.trigger_circuit_breaker("daily loss").await;
        assert_eq!(authority.emergency_level().await, EmergencyLevel::High);
    }
}
