//! Desk bootstrap - builds every component from configuration
//!
//! External collaborators (data sources, quotes, broker) are injected
//! through [`DeskAdapters`]; anything left out falls back to a paper
//! implementation or is simply absent.

use std::sync::Arc;
use tracing::info;

use crate::agents::{
    AnalystAgent, Analyzer, CandleSource, CollectorAgent, DataSource, PortfolioManager,
    PortfolioSizer, QuoteSource, SentimentAnalyzer, StrategistAgent, TechnicalAnalyzer,
};
use crate::approval::ApprovalAuthority;
use crate::bus::EventBus;
use crate::config::AppConfig;
use crate::execution::{Broker, OrderExecutor, PaperBroker};
use crate::risk::RiskGuard;

/// External collaborators wired into the desk
#[derive(Default)]
pub struct DeskAdapters {
    pub sources: Vec<Arc<dyn DataSource>>,
    /// Replaces the built-in analyst; `candles`, `technical` and `sentiment`
    /// are then unused
    pub analyst: Option<Arc<dyn Analyzer>>,
    pub candles: Option<Arc<dyn CandleSource>>,
    /// Replaces the candle-based technical analyzer
    pub technical: Option<Arc<dyn TechnicalAnalyzer>>,
    pub sentiment: Option<Arc<dyn SentimentAnalyzer>>,
    pub quotes: Option<Arc<dyn QuoteSource>>,
    /// Replaces the built-in portfolio manager; `quotes` is then unused
    pub portfolio: Option<Arc<dyn PortfolioSizer>>,
    pub broker: Option<Arc<dyn Broker>>,
}

/// Every component the coordinator drives, sharing one bus
#[derive(Clone)]
pub struct DeskComponents {
    pub bus: Arc<EventBus>,
    pub collector: Arc<CollectorAgent>,
    pub analyst: Arc<dyn Analyzer>,
    pub strategist: Arc<StrategistAgent>,
    pub portfolio: Arc<dyn PortfolioSizer>,
    pub authority: Arc<ApprovalAuthority>,
    pub risk: Arc<RiskGuard>,
    pub executor: Arc<OrderExecutor>,
}

impl DeskComponents {
    pub async fn build(config: &AppConfig, bus: Arc<EventBus>, adapters: DeskAdapters) -> Self {
        let collector = CollectorAgent::new(config.collector.clone(), Arc::clone(&bus));
        for source in adapters.sources {
            collector.register_source(source).await;
        }
        for task in crate::agents::default_tasks(&config.coordinator.universe) {
            collector.register_task(task).await;
        }

        let analyst: Arc<dyn Analyzer> = match adapters.analyst {
            Some(analyst) => analyst,
            None => {
                let mut analyst = AnalystAgent::new(config.analyst.clone(), Arc::clone(&bus))
                    .with_statement_fundamentals();
                if let Some(candles) = adapters.candles {
                    analyst = analyst.with_candles(candles);
                }
                if let Some(technical) = adapters.technical {
                    analyst = analyst.with_technical(technical);
                }
                if let Some(sentiment) = adapters.sentiment {
                    analyst = analyst.with_sentiment(sentiment);
                }
                Arc::new(analyst)
            }
        };

        let strategist = StrategistAgent::new(config.strategist.clone(), Arc::clone(&bus));

        let portfolio: Arc<dyn PortfolioSizer> = match adapters.portfolio {
            Some(portfolio) => portfolio,
            None => {
                let mut portfolio = PortfolioManager::new(config.portfolio.clone(), Arc::clone(&bus));
                if let Some(quotes) = adapters.quotes {
                    portfolio = portfolio.with_quotes(quotes);
                }
                Arc::new(portfolio)
            }
        };

        let broker: Arc<dyn Broker> = match adapters.broker {
            Some(broker) => broker,
            None => {
                info!("No broker configured, using paper broker");
                Arc::new(PaperBroker::new())
            }
        };

        Self {
            collector: Arc::new(collector),
            analyst,
            strategist: Arc::new(strategist),
            portfolio,
            authority: Arc::new(ApprovalAuthority::new(config.approval.clone(), Arc::clone(&bus))),
            risk: Arc::new(RiskGuard::new(config.risk.clone(), Arc::clone(&bus))),
            executor: Arc::new(OrderExecutor::new(
                broker,
                Arc::clone(&bus),
                config.execution.clone(),
            )),
            bus,
        }
    }

    /// Paper desk with no external data
    pub async fn paper(config: &AppConfig) -> Self {
        Self::build(config, Arc::new(EventBus::new()), DeskAdapters::default()).await
    }
}
