use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// External provider a collector pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// Brokerage quotes and bars
    Kis,
    /// Corporate filings
    Dart,
    NaverNews,
    /// Central bank series
    Bok,
    Fred,
}

impl DataSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceKind::Kis => "kis",
            DataSourceKind::Dart => "dart",
            DataSourceKind::NaverNews => "naver_news",
            DataSourceKind::Bok => "bok",
            DataSourceKind::Fred => "fred",
        }
    }
}

impl std::fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a collection request asks a source for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Tick,
    Orderbook,
    DailyOhlcv,
    MinuteCandles,
    FinancialStatement,
    News,
    MacroIndicator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub symbol: String,
    pub fiscal_period: String,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub filed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub symbol: Option<String>,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub series_id: String,
    pub value: f64,
    pub observed_on: NaiveDate,
}

/// A single item produced by a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketData {
    Tick(PriceTick),
    Orderbook(OrderbookSnapshot),
    DailyOhlcv { symbol: String, candles: Vec<Candle> },
    MinuteCandles { symbol: String, candles: Vec<Candle> },
    FinancialStatement(FinancialStatement),
    News(NewsArticle),
    MacroIndicator(MacroIndicator),
}

impl MarketData {
    pub fn kind(&self) -> DataKind {
        match self {
            MarketData::Tick(_) => DataKind::Tick,
            MarketData::Orderbook(_) => DataKind::Orderbook,
            MarketData::DailyOhlcv { .. } => DataKind::DailyOhlcv,
            MarketData::MinuteCandles { .. } => DataKind::MinuteCandles,
            MarketData::FinancialStatement(_) => DataKind::FinancialStatement,
            MarketData::News(_) => DataKind::News,
            MarketData::MacroIndicator(_) => DataKind::MacroIndicator,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            MarketData::Tick(t) => Some(&t.symbol),
            MarketData::Orderbook(o) => Some(&o.symbol),
            MarketData::DailyOhlcv { symbol, .. } | MarketData::MinuteCandles { symbol, .. } => {
                Some(symbol)
            }
            MarketData::FinancialStatement(f) => Some(&f.symbol),
            MarketData::News(n) => n.symbol.as_deref(),
            MarketData::MacroIndicator(_) => None,
        }
    }
}

/// Collected item tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedData {
    pub source: DataSourceKind,
    pub collected_at: DateTime<Utc>,
    pub data: MarketData,
}

impl CollectedData {
    pub fn new(source: DataSourceKind, data: MarketData) -> Self {
        Self {
            source,
            collected_at: Utc::now(),
            data,
        }
    }
}
