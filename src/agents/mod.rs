//! Desk agents - the collaborators driven by the coordinator
//!
//! Each agent implements `Agent` and owns its piece of state. Agents talk to
//! each other only through the event bus or through the coordinator.

pub mod analyst;
pub mod collector;
pub mod portfolio;
pub mod strategies;
pub mod strategist;
pub mod traits;

pub use analyst::{
    assess_regime, compute_indicators, AnalystAgent, AnalystConfig, AnalystStatus, CandleSource,
    CandleTechnicalAnalyzer, FundamentalAnalyzer, RegimeDetector, SentimentAnalyzer,
    StatementFundamentalAnalyzer, TechnicalAnalyzer, TrendRegimeDetector,
};
pub use collector::{
    default_tasks, CollectionFrequency, CollectionRequest, CollectionTask, CollectorAgent,
    CollectorConfig, CollectorStatus, DataSource,
};
pub use portfolio::{PortfolioConfig, PortfolioManager, PortfolioStatus, QuoteSource, StaticQuotes};
pub use strategies::{CompositeStrategy, MeanReversionStrategy, MomentumStrategy, ValueStrategy};
pub use strategist::{StrategistAgent, StrategistConfig, StrategistStatus, StrategyKind};
pub use traits::{Agent, AgentStatus, Analyzer, PortfolioSizer, Strategy};
