//! MainCoordinator - owns the desk lifecycle and the daily cycle
//!
//! Two paths move orders through the desk:
//!   - The daily cycle: seven ordered steps run by the scheduler (or on
//!     demand). Every event it causes carries the cycle's correlation id.
//!   - The reactive path: bus handlers for `price_tick`, `analysis_report`
//!     and `trade_signal`. They only act on uncorrelated events, only while
//!     Running, and never while a daily cycle is in progress.
//!
//! Both paths submit through the same approval authority and executor.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::{Agent, AgentStatus, Analyzer, PortfolioSizer};
use crate::approval::EmergencyLevel;
use crate::bus::{Event, EventBus, EventPayload, EventType, HandlerOutput};
use crate::config::AppConfig;
use crate::domain::{DataKind, DataSourceKind, OrderProposal, Portfolio, TradeSignal};
use crate::error::{DeskError, Result};

use super::bootstrap::{DeskAdapters, DeskComponents};
use super::config::CoordinatorConfig;
use super::lifecycle::{AgentLifecycle, ComponentInfo};
use super::schedule::next_cycle_at;
use super::state::{CycleResult, SystemState, SystemStatus};

const SOURCE: &str = "main_coordinator";

pub struct MainCoordinator {
    config: CoordinatorConfig,
    bus: Arc<EventBus>,
    components: DeskComponents,
    lifecycle: AgentLifecycle,
    state: RwLock<SystemState>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_cycle: RwLock<Option<CycleResult>>,
    errors: RwLock<VecDeque<String>>,
    wired: AtomicBool,
    /// Serializes initialize/start/stop/pause/resume
    transition: Mutex<()>,
    /// Serializes daily cycles
    cycle_lock: Mutex<()>,
    cycle_in_progress: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl MainCoordinator {
    pub fn new(config: CoordinatorConfig, components: DeskComponents) -> Arc<Self> {
        let mut lifecycle = AgentLifecycle::new(Duration::from_millis(config.agent_timeout_ms));
        lifecycle.register(components.collector.clone());
        lifecycle.register(components.analyst.clone().into_agent());
        lifecycle.register(components.strategist.clone());
        lifecycle.register(components.portfolio.clone().into_agent());
        lifecycle.register(components.authority.clone());

        Arc::new(Self {
            config,
            bus: Arc::clone(&components.bus),
            components,
            lifecycle,
            state: RwLock::new(SystemState::Initializing),
            started_at: RwLock::new(None),
            last_cycle: RwLock::new(None),
            errors: RwLock::new(VecDeque::new()),
            wired: AtomicBool::new(false),
            transition: Mutex::new(()),
            cycle_lock: Mutex::new(()),
            cycle_in_progress: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            scheduler: Mutex::new(None),
        })
    }

    /// Build every component from configuration on a fresh bus
    pub async fn from_config(config: &AppConfig, adapters: DeskAdapters) -> Arc<Self> {
        let components =
            DeskComponents::build(config, Arc::new(EventBus::new()), adapters).await;
        Self::new(config.coordinator.clone(), components)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn components(&self) -> &DeskComponents {
        &self.components
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub async fn state(&self) -> SystemState {
        *self.state.read().await
    }

    async fn set_state(&self, next: SystemState) -> Result<()> {
        let mut state = self.state.write().await;
        if *state == next {
            return Ok(());
        }
        if !state.can_transition_to(next) {
            return Err(DeskError::InvalidStateTransition {
                from: state.to_string(),
                to: next.to_string(),
            });
        }
        info!("System state: {} -> {}", *state, next);
        *state = next;
        Ok(())
    }

    async fn record_error(&self, message: String) {
        let mut errors = self.errors.write().await;
        errors.push_back(message);
        while errors.len() > self.config.max_recent_errors {
            errors.pop_front();
        }
    }

    // ==================== Lifecycle ====================

    /// Validate the setup and wire bus subscriptions. Wiring happens once;
    /// calling again only re-validates (and leaves `Error` on success).
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let _guard = self.transition.lock().await;
        let state = self.state().await;
        if !matches!(state, SystemState::Initializing | SystemState::Error) {
            return Err(DeskError::InvalidStateTransition {
                from: state.to_string(),
                to: SystemState::Initializing.to_string(),
            });
        }

        if let Err(reason) = self.validate_setup() {
            error!("Initialization failed: {}", reason);
            self.record_error(format!("Initialization failed: {}", reason)).await;
            self.set_state(SystemState::Error).await?;
            return Err(DeskError::InvalidConfig(reason));
        }

        if state == SystemState::Error {
            self.set_state(SystemState::Initializing).await?;
        }

        if !self.wired.swap(true, Ordering::SeqCst) {
            self.wire().await;
        }

        info!(
            "Coordinator initialized: {} symbols, agents {:?}",
            self.config.universe.len(),
            self.lifecycle.startup_order()
        );
        Ok(())
    }

    fn validate_setup(&self) -> std::result::Result<(), String> {
        if self.config.universe.is_empty() {
            return Err("symbol universe is empty".to_string());
        }
        if self.config.max_daily_trades == 0 {
            return Err("max_daily_trades must be positive".to_string());
        }
        Ok(())
    }

    async fn wire(self: &Arc<Self>) {
        let c = &self.components;
        c.risk.register().await;
        c.analyst.register().await;

        let authority = Arc::downgrade(&c.authority);
        self.bus
            .subscribe_fn(
                EventType::CircuitBreakerTriggered,
                "coordinator.circuit_breaker",
                move |event| {
                    let authority = authority.clone();
                    async move {
                        if let (Some(authority), EventPayload::CircuitBreakerTriggered(trip)) =
                            (authority.upgrade(), &event.payload)
                        {
                            authority.trigger_circuit_breaker(&trip.reason).await;
                        }
                        Ok(None)
                    }
                },
            )
            .await;

        self.on(EventType::EmergencyHalt, "coordinator.emergency_halt", |coordinator, event| async move {
            if let EventPayload::EmergencyHalt(notice) = &event.payload {
                warn!("Emergency halt observed ({}): stopping", notice.reason);
                tokio::spawn(async move {
                    if let Err(e) = coordinator.stop().await {
                        error!("Stop after emergency halt failed: {}", e);
                    }
                });
            }
            Ok(None)
        })
        .await;

        self.on(EventType::PriceTick, "coordinator.price_tick", |coordinator, event| async move {
            coordinator.on_price_tick(event).await
        })
        .await;
        self.on(EventType::AnalysisReport, "coordinator.analysis_report", |coordinator, event| async move {
            coordinator.on_analysis_report(event).await
        })
        .await;
        self.on(EventType::TradeSignal, "coordinator.trade_signal", |coordinator, event| async move {
            coordinator.on_trade_signal(event).await
        })
        .await;

        debug!("Coordinator subscriptions wired");
    }

    /// Subscribe a handler that holds the coordinator weakly
    async fn on<F, Fut>(self: &Arc<Self>, topic: EventType, name: &str, f: F)
    where
        F: Fn(Arc<Self>, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.bus
            .subscribe_fn(topic, name, move |event| {
                let call = weak.upgrade().map(|coordinator| f(coordinator, event));
                async move {
                    match call {
                        Some(call) => call.await,
                        None => Ok(None),
                    }
                }
            })
            .await;
    }

    /// Start agents in order, then enter Running
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let _guard = self.transition.lock().await;
        match self.state().await {
            SystemState::Running => {
                warn!("System already running");
                return Ok(());
            }
            SystemState::Initializing if self.wired.load(Ordering::SeqCst) => {}
            SystemState::Initializing => {
                return Err(DeskError::NotInitialized(
                    "call initialize() before start()".to_string(),
                ))
            }
            other => {
                return Err(DeskError::InvalidStateTransition {
                    from: other.to_string(),
                    to: SystemState::Running.to_string(),
                })
            }
        }

        info!("Starting trading desk...");
        if let Err(e) = self.lifecycle.start_all().await {
            error!("Failed to start desk: {}", e);
            self.record_error(format!("Start failed: {}", e)).await;
            return Err(e);
        }

        *self.started_at.write().await = Some(Utc::now());
        self.set_state(SystemState::Running).await?;

        if self.config.auto_start_cycle {
            let (tx, rx) = watch::channel(false);
            let handle = self.spawn_scheduler(rx);
            *self.shutdown.lock().await = Some(tx);
            *self.scheduler.lock().await = Some(handle);
        }

        info!("Trading desk started");
        Ok(())
    }

    fn spawn_scheduler(self: &Arc<Self>, mut rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let cycle_time = self.config.cycle_time;

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_cycle_at(now, cycle_time);
                let wait = (next - now).to_std().unwrap_or_default();
                info!(
                    "Next daily cycle at {} (in {:.1}h)",
                    next,
                    wait.as_secs_f64() / 3600.0
                );

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                match coordinator.state().await {
                    SystemState::Running => {
                        coordinator.run_daily_cycle().await;
                    }
                    state => info!("Skipping daily cycle while {}", state),
                }
            }
            debug!("Daily cycle scheduler exited");
        })
    }

    /// Stop the scheduler, wait for an in-flight cycle, then stop agents in
    /// reverse order. A no-op unless Running or Paused.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        let state = self.state().await;
        if !matches!(state, SystemState::Running | SystemState::Paused) {
            debug!("Stop ignored while {}", state);
            return Ok(());
        }

        info!("Stopping trading desk...");
        self.set_state(SystemState::Stopping).await?;

        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.scheduler.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Daily cycle scheduler ended abnormally: {}", e);
            }
        }

        {
            let _cycle = self.cycle_lock.lock().await;
            self.lifecycle.stop_all("coordinator stop").await;
        }

        self.set_state(SystemState::Initializing).await?;
        info!("Trading desk stopped");
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.set_state(SystemState::Paused).await
    }

    pub async fn resume(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.set_state(SystemState::Running).await
    }

    // ==================== Daily cycle ====================

    /// Run the seven ordered steps. Any error or panic aborts the remaining
    /// steps; orders already executed stand and the desk stays Running.
    pub async fn run_daily_cycle(&self) -> CycleResult {
        let _cycle = self.cycle_lock.lock().await;
        self.cycle_in_progress.store(true, Ordering::SeqCst);

        let mut result = CycleResult::daily();
        info!("Starting daily trading cycle {}", result.cycle_id);

        let outcome = AssertUnwindSafe(self.cycle_steps(&mut result))
            .catch_unwind()
            .await;
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("daily cycle panicked".to_string()),
        };

        let result = result.finish(error);
        match &result.error_message {
            None => info!(
                "Daily cycle completed: {} signals, {} trades, {}ms",
                result.signals_generated, result.trades_executed, result.duration_ms
            ),
            Some(message) => {
                error!(
                    "Daily cycle failed after step {}: {}",
                    result.steps_completed, message
                );
                self.record_error(format!("Cycle error: {}", message)).await;
            }
        }

        *self.last_cycle.write().await = Some(result.clone());
        self.cycle_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn cycle_steps(&self, result: &mut CycleResult) -> Result<()> {
        let c = &self.components;
        let corr = Some(result.cycle_id);

        // 1. Open the daily plan
        c.authority.start_daily_cycle(corr).await;
        result.steps_completed = 1;

        // 2. Collect daily bars for the universe
        for symbol in &self.config.universe {
            c.collector
                .trigger_collection(
                    DataSourceKind::Kis,
                    DataKind::DailyOhlcv,
                    std::slice::from_ref(symbol),
                )
                .await;
        }
        result.steps_completed = 2;

        // 3. Analyze and signal
        for symbol in &self.config.universe {
            let Some(report) = c.analyst.analyze_correlated(symbol, corr).await else {
                continue;
            };
            if c.strategist.generate_with_correlation(&report, corr).await.is_some() {
                result.signals_generated += 1;
            }
        }
        result.steps_completed = 3;

        // 4. Size active signals
        let signals = c.strategist.get_active_signals().await;
        let cash = c.portfolio.portfolio().await.cash;
        let proposals = c.portfolio.generate_order_proposals(&signals, cash).await?;
        debug!("{} proposals from {} active signals", proposals.len(), signals.len());
        result.steps_completed = 4;

        // 5. Review and execute
        for proposal in proposals.iter().take(self.config.max_daily_trades) {
            if self.submit(proposal, corr).await? {
                result.trades_executed += 1;
            }
        }
        result.steps_completed = 5;

        // 6. Close the daily plan
        c.authority.end_daily_cycle(corr).await;
        result.steps_completed = 6;

        // 7. Rebalance through the same approval path
        let rebalance = c.portfolio.rebalance().await?;
        for proposal in rebalance.iter().take(self.config.max_rebalance_orders) {
            self.submit(proposal, corr).await?;
        }
        result.steps_completed = 7;

        Ok(())
    }

    /// Publish, gate, execute and book one proposal. Returns whether it filled.
    async fn submit(&self, proposal: &OrderProposal, correlation_id: Option<Uuid>) -> Result<bool> {
        let c = &self.components;
        self.bus
            .publish(
                Event::new(SOURCE, EventPayload::OrderProposal(proposal.clone()))
                    .with_correlation(correlation_id),
            )
            .await;

        if self.config.pre_trade_risk_check {
            let portfolio = c.portfolio.portfolio().await;
            let report = c
                .risk
                .validate_order(
                    &proposal.symbol,
                    proposal.side,
                    proposal.quantity,
                    proposal.price.unwrap_or_default(),
                    portfolio.total_value,
                    &portfolio.position_values(),
                )
                .await;
            if !report.result.is_passed() {
                warn!(
                    "Risk guard {} {} {}: {}",
                    report.result, proposal.side, proposal.symbol, report.message
                );
                return Ok(false);
            }
        }

        let decision = c.authority.review_with_correlation(proposal, correlation_id).await;
        if !decision.status.is_approved() {
            return Ok(false);
        }

        let mut order = proposal.clone();
        if let Some(quantity) = decision.approved_quantity {
            order.quantity = quantity;
        }
        if decision.approved_price.is_some() {
            order.price = decision.approved_price;
        }

        let execution = c.executor.execute(&order, correlation_id).await;
        if !execution.is_filled() {
            return Ok(false);
        }

        order.quantity = execution.quantity;
        if execution.price.is_some() {
            order.price = execution.price;
        }
        let outcome = c.portfolio.execute_order(&order).await?;
        let unrealized = c.portfolio.portfolio().await.unrealized_pnl();
        c.risk.update_daily_pnl(outcome.realized_pnl(), unrealized).await;
        Ok(outcome.is_applied())
    }

    // ==================== Reactive path ====================

    async fn reacts_to(&self, event: &Event) -> bool {
        event.correlation_id.is_none()
            && !self.cycle_in_progress.load(Ordering::SeqCst)
            && self.state().await.is_trading()
    }

    async fn on_price_tick(&self, event: Arc<Event>) -> Result<HandlerOutput> {
        if !self.reacts_to(&event).await {
            return Ok(None);
        }
        if let EventPayload::PriceTick(tick) = &event.payload {
            self.components.analyst.analyze(&tick.symbol).await;
        }
        Ok(None)
    }

    async fn on_analysis_report(&self, event: Arc<Event>) -> Result<HandlerOutput> {
        if !self.reacts_to(&event).await {
            return Ok(None);
        }
        if let EventPayload::AnalysisReport(report) = &event.payload {
            self.components.strategist.generate_signal(report).await;
        }
        Ok(None)
    }

    async fn on_trade_signal(&self, event: Arc<Event>) -> Result<HandlerOutput> {
        if !self.reacts_to(&event).await {
            return Ok(None);
        }
        let EventPayload::TradeSignal(signal) = &event.payload else {
            return Ok(None);
        };

        let portfolio = &self.components.portfolio;
        let cash = portfolio.portfolio().await.cash;
        let proposals = portfolio
            .generate_order_proposals(std::slice::from_ref(signal), cash)
            .await?;
        for proposal in proposals.iter().take(self.config.max_reactive_orders) {
            self.submit(proposal, None).await?;
        }
        Ok(None)
    }

    // ==================== Manual triggers ====================

    /// Analyze one symbol and return its signal.
    ///
    /// Nothing is traded now. The signal joins the strategist's active set,
    /// so the next daily cycle sizes it with the rest in step 4.
    pub async fn trigger_signal_generation(&self, symbol: &str) -> Option<TradeSignal> {
        let state = self.state().await;
        if !state.is_trading() {
            warn!("Signal generation for {} ignored while {}", symbol, state);
            return None;
        }

        let corr = Some(Uuid::new_v4());
        let report = self.components.analyst.analyze_correlated(symbol, corr).await?;
        self.components
            .strategist
            .generate_with_correlation(&report, corr)
            .await
    }

    /// Set the emergency level; Critical also stops the desk
    pub async fn trigger_emergency(&self, level: EmergencyLevel, reason: &str) -> Result<()> {
        warn!("Emergency triggered: {} - {}", level, reason);
        self.components.authority.set_emergency(level, reason).await;
        if level.is_critical() {
            self.stop().await?;
        }
        Ok(())
    }

    // ==================== Reads ====================

    pub async fn get_status(&self) -> SystemStatus {
        let c = &self.components;
        let mut agents: BTreeMap<String, AgentStatus> = [
            c.collector.as_ref() as &dyn Agent,
            c.strategist.as_ref(),
            c.authority.as_ref(),
        ]
        .iter()
        .map(|a| (a.name().to_string(), a.status()))
        .collect();
        agents.insert(c.analyst.name().to_string(), c.analyst.status());
        agents.insert(c.portfolio.name().to_string(), c.portfolio.status());

        SystemStatus {
            state: self.state().await,
            started_at: *self.started_at.read().await,
            last_cycle: self.last_cycle.read().await.clone(),
            agents,
            emergency_level: c.authority.emergency_level().await,
            circuit_breaker_triggered: c.risk.is_circuit_breaker_triggered().await,
            errors: self.errors.read().await.iter().cloned().collect(),
        }
    }

    pub async fn get_agent_lifecycle(&self) -> BTreeMap<String, ComponentInfo> {
        self.lifecycle.get_all_states().await
    }

    pub async fn get_portfolio_status(&self) -> Portfolio {
        self.components.portfolio.portfolio().await
    }

    pub async fn get_active_signals(&self) -> Vec<TradeSignal> {
        self.components.strategist.get_active_signals().await
    }

    pub async fn last_cycle(&self) -> Option<CycleResult> {
        self.last_cycle.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventType;
    use crate::domain::{OrderSide, PriceTick, SignalDirection};
    use crate::error::CollaboratorError;
    use crate::execution::broker::MockBroker;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn quiet_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.coordinator.auto_start_cycle = false;
        config.coordinator.universe = vec!["005930".to_string(), "000660".to_string()];
        config.collector.scheduler_enabled = false;
        config
    }

    async fn running(config: &AppConfig) -> Arc<MainCoordinator> {
        let coordinator = MainCoordinator::from_config(config, DeskAdapters::default()).await;
        coordinator.initialize().await.unwrap();
        coordinator.start().await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let coordinator = MainCoordinator::from_config(&quiet_config(), DeskAdapters::default()).await;
        assert_eq!(coordinator.state().await, SystemState::Initializing);

        // start before initialize
        assert!(matches!(
            coordinator.start().await,
            Err(DeskError::NotInitialized(_))
        ));

        coordinator.initialize().await.unwrap();
        coordinator.start().await.unwrap();
        assert_eq!(coordinator.state().await, SystemState::Running);
        assert!(coordinator.get_status().await.agents.values().all(|s| s.is_running()));

        // second start is a no-op
        coordinator.start().await.unwrap();

        coordinator.pause().await.unwrap();
        assert_eq!(coordinator.state().await, SystemState::Paused);
        coordinator.resume().await.unwrap();

        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state().await, SystemState::Initializing);
        assert!(coordinator.get_status().await.agents.values().all(|s| !s.is_running()));

        // stop is idempotent
        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state().await, SystemState::Initializing);
    }

    #[tokio::test]
    async fn test_empty_universe_fails_initialization() {
        let mut config = quiet_config();
        config.coordinator.universe.clear();
        let coordinator = MainCoordinator::from_config(&config, DeskAdapters::default()).await;

        assert!(coordinator.initialize().await.is_err());
        assert_eq!(coordinator.state().await, SystemState::Error);
        assert!(coordinator.start().await.is_err());
        assert_eq!(coordinator.get_status().await.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_without_signals_succeeds() {
        let coordinator = running(&quiet_config()).await;
        let result = coordinator.run_daily_cycle().await;

        assert!(result.success);
        assert_eq!(result.signals_generated, 0);
        assert_eq!(result.trades_executed, 0);
        assert_eq!(result.steps_completed, 7);
        assert!(result.completed_at.is_some());
        assert_eq!(coordinator.last_cycle().await, Some(result));
        assert_eq!(coordinator.state().await, SystemState::Running);

        // plan opened and closed
        assert!(coordinator.components().authority.get_daily_plan().await.is_none());
    }

    #[tokio::test]
    async fn test_critical_emergency_stops_desk() {
        let coordinator = running(&quiet_config()).await;
        coordinator
            .trigger_emergency(EmergencyLevel::Critical, "manual stop")
            .await
            .unwrap();

        assert_eq!(coordinator.state().await, SystemState::Initializing);
        let status = coordinator.get_status().await;
        assert_eq!(status.emergency_level, EmergencyLevel::Critical);
    }

    #[tokio::test]
    async fn test_signal_generation_requires_running() {
        let coordinator = MainCoordinator::from_config(&quiet_config(), DeskAdapters::default()).await;
        coordinator.initialize().await.unwrap();
        assert!(coordinator.trigger_signal_generation("005930").await.is_none());
    }

    #[tokio::test]
    async fn test_reactive_trade_signal_is_executed() {
        let config = quiet_config();
        let coordinator = running(&config).await;
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executed);
        coordinator
            .bus()
            .subscribe_fn(EventType::OrderExecuted, "test.executed", move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await;

        // 100M x 10% x 0.5 = 5M, rounded down to 70 shares (4.9M, under manual review)
        let mut signal = TradeSignal::new("005930", SignalDirection::Buy, 0.5);
        signal.target_price = Some(dec!(70000));
        coordinator
            .bus()
            .publish(Event::new("test", EventPayload::TradeSignal(signal.clone())))
            .await;
        assert_eq!(executed.load(Ordering::SeqCst), 1);

        let position = coordinator
            .get_portfolio_status()
            .await
            .position("005930")
            .cloned()
            .unwrap();
        assert_eq!(position.quantity, 70);

        // correlated events belong to a cycle or a manual trigger
        coordinator
            .bus()
            .publish(
                Event::new("test", EventPayload::TradeSignal(signal))
                    .with_correlation(Some(Uuid::new_v4())),
            )
            .await;
        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reactive_path_idle_while_paused() {
        let coordinator = running(&quiet_config()).await;
        coordinator.pause().await.unwrap();

        let mut signal = TradeSignal::new("005930", SignalDirection::Buy, 0.5);
        signal.target_price = Some(dec!(70000));
        coordinator
            .bus()
            .publish(Event::new("test", EventPayload::TradeSignal(signal)))
            .await;
        assert!(coordinator.get_portfolio_status().await.positions.is_empty());

        // price ticks are ignored too
        let reports = Arc::new(AtomicUsize::new(0));
        {
            let reports = Arc::clone(&reports);
            coordinator
                .bus()
                .subscribe_fn(EventType::AnalysisReport, "test.reports", move |_| {
                    let reports = Arc::clone(&reports);
                    async move {
                        reports.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    }
                })
                .await;
        }
        let tick = PriceTick {
            symbol: "005930".to_string(),
            price: dec!(70000),
            volume: 100,
            timestamp: Utc::now(),
        };
        let report = coordinator
            .bus()
            .publish(Event::new("test", EventPayload::PriceTick(tick)))
            .await;
        assert_eq!(report.failed, 0);
        assert_eq!(reports.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broker_failure_is_not_a_trade() {
        let mut broker = MockBroker::new();
        broker
            .expect_place_order()
            .returning(|_| Err(CollaboratorError::rejected("broker", "market closed")));

        let config = quiet_config();
        let adapters = DeskAdapters {
            broker: Some(Arc::new(broker)),
            ..DeskAdapters::default()
        };
        let coordinator = MainCoordinator::from_config(&config, adapters).await;
        coordinator.initialize().await.unwrap();
        coordinator.start().await.unwrap();

        let proposal =
            OrderProposal::new("005930", OrderSide::Buy, 10, Some(dec!(70000)));
        let filled = coordinator.submit(&proposal, None).await.unwrap();
        assert!(!filled);
        assert!(coordinator.get_portfolio_status().await.positions.is_empty());
    }

    #[tokio::test]
    async fn test_emergency_halt_event_stops_desk() {
        let coordinator = running(&quiet_config()).await;
        coordinator
            .components()
            .authority
            .set_emergency(EmergencyLevel::Critical, "operator")
            .await;

        // the halt observer stops the desk in a detached task
        for _ in 0..50 {
            if coordinator.state().await == SystemState::Initializing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(coordinator.state().await, SystemState::Initializing);
    }
}
