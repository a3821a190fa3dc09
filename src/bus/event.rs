//! Bus events
//!
//! Every topic carries exactly one payload shape. The topic of an [`Event`] is
//! derived from its payload, so the two cannot disagree.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::approval::EmergencyLevel;
use crate::domain::{
    AnalysisReport, Candle, DataKind, DataSourceKind, FinancialStatement, MacroIndicator,
    NewsArticle, OrderDecision, OrderExecution, OrderProposal, OrderbookSnapshot, Portfolio,
    PriceTick, TradeSignal,
};

/// Closed set of bus topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PriceTick,
    AnalysisReport,
    TradeSignal,
    OrderProposal,
    OrderApproved,
    OrderRejected,
    OrderExecuted,
    OrderFailed,
    PortfolioUpdated,
    CircuitBreakerTriggered,
    DailyCycleStart,
    DailyCycleComplete,
    EmergencyLevelChanged,
    EmergencyHalt,
    CollectionStarted,
    CollectionComplete,
    CollectionError,
    FinancialStatementUpdate,
    NewsArticle,
    MacroIndicatorUpdate,
    OrderbookSnapshot,
    MinuteCandles,
    DailyOhlcv,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PriceTick => "price_tick",
            EventType::AnalysisReport => "analysis_report",
            EventType::TradeSignal => "trade_signal",
            EventType::OrderProposal => "order_proposal",
            EventType::OrderApproved => "order_approved",
            EventType::OrderRejected => "order_rejected",
            EventType::OrderExecuted => "order_executed",
            EventType::OrderFailed => "order_failed",
            EventType::PortfolioUpdated => "portfolio_updated",
            EventType::CircuitBreakerTriggered => "circuit_breaker_triggered",
            EventType::DailyCycleStart => "daily_cycle_start",
            EventType::DailyCycleComplete => "daily_cycle_complete",
            EventType::EmergencyLevelChanged => "emergency_level_changed",
            EventType::EmergencyHalt => "emergency_halt",
            EventType::CollectionStarted => "collection_started",
            EventType::CollectionComplete => "collection_complete",
            EventType::CollectionError => "collection_error",
            EventType::FinancialStatementUpdate => "financial_statement_update",
            EventType::NewsArticle => "news_article",
            EventType::MacroIndicatorUpdate => "macro_indicator_update",
            EventType::OrderbookSnapshot => "orderbook_snapshot",
            EventType::MinuteCandles => "minute_candles",
            EventType::DailyOhlcv => "daily_ohlcv",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerTrip {
    pub reason: String,
    pub loss: Decimal,
    pub loss_pct: Decimal,
    pub triggered_at: DateTime<Utc>,
    pub cooldown_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCycleOpened {
    pub date: NaiveDate,
    pub max_trades: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCycleSummary {
    pub date: NaiveDate,
    pub approved_count: usize,
    pub rejected_count: usize,
    pub held_count: usize,
    pub total_buy_value: Decimal,
    pub total_sell_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyChange {
    pub from: EmergencyLevel,
    pub to: EmergencyLevel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyHaltNotice {
    pub level: EmergencyLevel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionNotice {
    pub source: DataSourceKind,
    pub kind: DataKind,
    pub symbols: Vec<String>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub source: DataSourceKind,
    pub kind: DataKind,
    pub items: usize,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionFailure {
    pub source: DataSourceKind,
    pub task_id: Option<String>,
    pub error: String,
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleBatch {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

/// Closed union of payloads, tagged by topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    PriceTick(PriceTick),
    AnalysisReport(AnalysisReport),
    TradeSignal(TradeSignal),
    OrderProposal(OrderProposal),
    OrderApproved(OrderDecision),
    OrderRejected(OrderDecision),
    OrderExecuted(OrderExecution),
    OrderFailed(OrderExecution),
    PortfolioUpdated(Portfolio),
    CircuitBreakerTriggered(CircuitBreakerTrip),
    DailyCycleStart(DailyCycleOpened),
    DailyCycleComplete(DailyCycleSummary),
    EmergencyLevelChanged(EmergencyChange),
    EmergencyHalt(EmergencyHaltNotice),
    CollectionStarted(CollectionNotice),
    CollectionComplete(CollectionSummary),
    CollectionError(CollectionFailure),
    FinancialStatementUpdate(FinancialStatement),
    NewsArticle(NewsArticle),
    MacroIndicatorUpdate(MacroIndicator),
    OrderbookSnapshot(OrderbookSnapshot),
    MinuteCandles(CandleBatch),
    DailyOhlcv(CandleBatch),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PriceTick(_) => EventType::PriceTick,
            EventPayload::AnalysisReport(_) => EventType::AnalysisReport,
            EventPayload::TradeSignal(_) => EventType::TradeSignal,
            EventPayload::OrderProposal(_) => EventType::OrderProposal,
            EventPayload::OrderApproved(_) => EventType::OrderApproved,
            EventPayload::OrderRejected(_) => EventType::OrderRejected,
            EventPayload::OrderExecuted(_) => EventType::OrderExecuted,
            EventPayload::OrderFailed(_) => EventType::OrderFailed,
            EventPayload::PortfolioUpdated(_) => EventType::PortfolioUpdated,
            EventPayload::CircuitBreakerTriggered(_) => EventType::CircuitBreakerTriggered,
            EventPayload::DailyCycleStart(_) => EventType::DailyCycleStart,
            EventPayload::DailyCycleComplete(_) => EventType::DailyCycleComplete,
            EventPayload::EmergencyLevelChanged(_) => EventType::EmergencyLevelChanged,
            EventPayload::EmergencyHalt(_) => EventType::EmergencyHalt,
            EventPayload::CollectionStarted(_) => EventType::CollectionStarted,
            EventPayload::CollectionComplete(_) => EventType::CollectionComplete,
            EventPayload::CollectionError(_) => EventType::CollectionError,
            EventPayload::FinancialStatementUpdate(_) => EventType::FinancialStatementUpdate,
            EventPayload::NewsArticle(_) => EventType::NewsArticle,
            EventPayload::MacroIndicatorUpdate(_) => EventType::MacroIndicatorUpdate,
            EventPayload::OrderbookSnapshot(_) => EventType::OrderbookSnapshot,
            EventPayload::MinuteCandles(_) => EventType::MinuteCandles,
            EventPayload::DailyOhlcv(_) => EventType::DailyOhlcv,
        }
    }
}

/// An immutable bus message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<Uuid>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_type_follows_payload() {
        let tick = PriceTick {
            symbol: "005930".into(),
            price: dec!(71200),
            volume: 1500,
            timestamp: Utc::now(),
        };
        let event = Event::new("collector", EventPayload::PriceTick(tick));
        assert_eq!(event.event_type(), EventType::PriceTick);
        assert_eq!(event.event_type().to_string(), "price_tick");
    }

    #[test]
    fn test_event_serializes_with_topic_tag() {
        let event = Event::new(
            "approval_authority",
            EventPayload::EmergencyHalt(EmergencyHaltNotice {
                level: EmergencyLevel::Critical,
                reason: "manual stop".into(),
            }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "emergency_halt");
        assert_eq!(json["payload"]["level"], "CRITICAL");
        assert_eq!(json["source"], "approval_authority");
    }
}
