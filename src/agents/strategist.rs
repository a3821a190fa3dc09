//! Strategist Agent - turns analysis into ranked trade signals
//!
//! Holds the current investment thesis (driven by the detected regime) and
//! the latest actionable signal per symbol.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::strategies::{CompositeStrategy, MeanReversionStrategy, MomentumStrategy, ValueStrategy};
use super::traits::{Agent, AgentStatus, Strategy};
use crate::bus::{Event, EventBus, EventPayload};
use crate::domain::{AnalysisReport, InvestmentThesis, MarketRegime, SignalDirection, TradeSignal};
use crate::error::Result;

const SOURCE: &str = "strategist_agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Momentum,
    Value,
    MeanReversion,
    Composite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategistConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Composite
}

impl Default for StrategistConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategistStatus {
    pub running: bool,
    pub strategy: StrategyKind,
    pub regime: MarketRegime,
    pub active_signals: usize,
}

pub struct StrategistAgent {
    config: StrategistConfig,
    bus: Arc<EventBus>,
    strategies: HashMap<StrategyKind, Arc<dyn Strategy>>,
    thesis: RwLock<InvestmentThesis>,
    active: DashMap<String, TradeSignal>,
    running: AtomicBool,
}

impl StrategistAgent {
    pub fn new(config: StrategistConfig, bus: Arc<EventBus>) -> Self {
        let mut strategies: HashMap<StrategyKind, Arc<dyn Strategy>> = HashMap::new();
        strategies.insert(StrategyKind::Momentum, Arc::new(MomentumStrategy));
        strategies.insert(StrategyKind::Value, Arc::new(ValueStrategy));
        strategies.insert(StrategyKind::MeanReversion, Arc::new(MeanReversionStrategy));
        strategies.insert(StrategyKind::Composite, Arc::new(CompositeStrategy::default()));

        Self {
            config,
            bus,
            strategies,
            thesis: RwLock::new(InvestmentThesis::default()),
            active: DashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn register_strategy(&mut self, kind: StrategyKind, strategy: Arc<dyn Strategy>) {
        info!("Registered strategy: {:?} ({})", kind, strategy.name());
        self.strategies.insert(kind, strategy);
    }

    pub async fn generate_signal(&self, report: &AnalysisReport) -> Option<TradeSignal> {
        self.generate_with_correlation(report, None).await
    }

    /// Apply the configured strategy. An actionable signal replaces the
    /// symbol's active signal and is published; otherwise the symbol's
    /// active signal is dropped.
    pub async fn generate_with_correlation(
        &self,
        report: &AnalysisReport,
        correlation_id: Option<Uuid>,
    ) -> Option<TradeSignal> {
        if let Some(regime) = &report.regime {
            self.observe_regime(regime.regime).await;
        }

        let Some(strategy) = self.strategies.get(&self.config.strategy) else {
            warn!("Strategy {:?} not registered", self.config.strategy);
            return None;
        };

        let thesis = self.thesis.read().await.clone();
        let signal = strategy
            .generate(report, Some(&thesis))
            .filter(|s| s.direction.is_actionable());

        let Some(signal) = signal else {
            self.active.remove(&report.symbol);
            debug!("No actionable signal for {}", report.symbol);
            return None;
        };

        info!(
            "Signal {} {} strength {:.2} ({})",
            signal.direction, signal.symbol, signal.strength, signal.strategy_name
        );
        self.active.insert(signal.symbol.clone(), signal.clone());
        self.bus
            .publish(
                Event::new(SOURCE, EventPayload::TradeSignal(signal.clone()))
                    .with_correlation(correlation_id),
            )
            .await;
        Some(signal)
    }

    /// Signals for a batch of reports, strongest first
    pub async fn evaluate_universe(&self, reports: &[AnalysisReport]) -> Vec<TradeSignal> {
        let mut signals = Vec::new();
        for report in reports {
            if let Some(signal) = self.generate_signal(report).await {
                signals.push(signal);
            }
        }
        self.rank_signals(signals).await
    }

    /// Switch the thesis when the regime changes
    pub async fn set_investment_direction(&self, regime: MarketRegime) -> InvestmentThesis {
        let thesis = InvestmentThesis::for_regime(regime);
        *self.thesis.write().await = thesis.clone();
        info!(
            "Investment thesis set: {} ({:?}, cash target {})",
            regime, thesis.mode, thesis.cash_target_pct
        );
        thesis
    }

    async fn observe_regime(&self, regime: MarketRegime) {
        if self.thesis.read().await.regime != regime {
            self.set_investment_direction(regime).await;
        }
    }

    /// Strength weighted by urgency and by agreement with the regime
    pub async fn rank_signals(&self, signals: Vec<TradeSignal>) -> Vec<TradeSignal> {
        let regime = self.thesis.read().await.regime;
        let mut scored: Vec<(f64, TradeSignal)> = signals
            .into_iter()
            .map(|signal| {
                let mut score = signal.strength * signal.urgency.rank_multiplier();
                let aligned = matches!(
                    (regime, signal.direction),
                    (MarketRegime::Bull, SignalDirection::Buy) | (MarketRegime::Bear, SignalDirection::Sell)
                );
                if aligned {
                    score *= 1.2;
                }
                (score, signal)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, s)| s).collect()
    }

    /// Active signals, ranked
    pub async fn get_active_signals(&self) -> Vec<TradeSignal> {
        let signals: Vec<TradeSignal> = self.active.iter().map(|e| e.value().clone()).collect();
        self.rank_signals(signals).await
    }

    pub fn get_signal(&self, symbol: &str) -> Option<TradeSignal> {
        self.active.get(symbol).map(|s| s.value().clone())
    }

    pub async fn current_thesis(&self) -> InvestmentThesis {
        self.thesis.read().await.clone()
    }

    pub async fn get_status(&self) -> StrategistStatus {
        StrategistStatus {
            running: self.running.load(Ordering::SeqCst),
            strategy: self.config.strategy,
            regime: self.thesis.read().await.regime,
            active_signals: self.active.len(),
        }
    }
}

#[async_trait]
impl Agent for StrategistAgent {
    fn name(&self) -> &str {
        SOURCE
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::from_running(self.running.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let thesis = self.thesis.read().await.regime;
        info!("Strategist Agent started (regime {})", thesis);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Strategist Agent stopped");
        Ok(())
    }
}
