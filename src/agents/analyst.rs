//! Analyst Agent - scores symbols from price, filing and news data
//!
//! Each analysis dimension is a pluggable analyzer. A failing analyzer is
//! logged and its sub-score left absent; the report itself is always
//! produced.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::traits::{Agent, AgentStatus, Analyzer};
use crate::bus::{Event, EventBus, EventPayload, EventType};
use crate::domain::{
    AnalysisReport, Candle, FinancialStatement, FundamentalScore, MarketRegime, RegimeAssessment,
    SentimentScore, TechnicalSignals, TrendPattern,
};
use crate::error::{CollaboratorError, Result};

const SOURCE: &str = "analyst_agent";

type AnalyzerResult<T> = std::result::Result<T, CollaboratorError>;

/// Daily bars for a symbol, oldest first
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn daily_candles(&self, symbol: &str, limit: usize) -> AnalyzerResult<Vec<Candle>>;
}

#[async_trait]
pub trait TechnicalAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str) -> AnalyzerResult<TechnicalSignals>;
}

#[async_trait]
pub trait FundamentalAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str) -> AnalyzerResult<FundamentalScore>;
}

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str) -> AnalyzerResult<SentimentScore>;
}

/// Market-wide regime, independent of the symbol being analyzed
#[async_trait]
pub trait RegimeDetector: Send + Sync {
    async fn detect(&self) -> AnalyzerResult<RegimeAssessment>;
}

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().filter_map(|c| c.close.to_f64()).collect()
}

fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average series seeded with the first value
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(v) => *v,
        None => return out,
    };
    for v in values {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if values.len() <= period {
        return None;
    }
    let window = &values[values.len() - period - 1..];
    let (mut gain, mut loss) = (0.0, 0.0);
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain += delta;
        } else {
            loss -= delta;
        }
    }
    gain /= period as f64;
    loss /= period as f64;
    Some(match (gain, loss) {
        (g, l) if g == 0.0 && l == 0.0 => 50.0,
        (_, l) if l == 0.0 => 100.0,
        (g, l) => 100.0 - 100.0 / (1.0 + g / l),
    })
}

fn macd_histogram(values: &[f64]) -> Option<f64> {
    if values.len() < 35 {
        return None;
    }
    let fast = ema_series(values, 12);
    let slow = ema_series(values, 26);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema_series(&line, 9);
    Some(line.last()? - signal.last()?)
}

fn std_dev(values: &[f64], sample: bool) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let denom = (if sample { n - 1 } else { n }) as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / denom).sqrt()
}

fn pattern(values: &[f64]) -> Option<TrendPattern> {
    if values.len() < 5 {
        return None;
    }
    let recent = &values[values.len() - 5..];
    if recent.windows(2).all(|w| w[0] < w[1]) {
        Some(TrendPattern::Uptrend)
    } else if recent.windows(2).all(|w| w[0] > w[1]) {
        Some(TrendPattern::Downtrend)
    } else {
        Some(TrendPattern::Sideways)
    }
}

/// RSI-14, MACD(12,26,9) histogram, SMA-20, Bollinger(20, 2) and the
/// five-bar pattern. Indicators without enough history are `None`.
pub fn compute_indicators(candles: &[Candle]) -> TechnicalSignals {
    let values = closes(candles);
    let sma_20 = sma(&values, 20);
    let (bb_upper, bb_lower) = match sma_20 {
        Some(mid) => {
            let sd = std_dev(&values[values.len() - 20..], false);
            (Some(mid + 2.0 * sd), Some(mid - 2.0 * sd))
        }
        None => (None, None),
    };

    TechnicalSignals {
        last_close: values.last().copied(),
        rsi: rsi(&values, 14),
        macd_histogram: macd_histogram(&values),
        sma_20,
        bb_upper,
        bb_lower,
        pattern: pattern(&values),
    }
}

/// Price vs SMA-20 and SMA-60 (SMA-20 stands in when history is short)
pub fn assess_regime(candles: &[Candle]) -> Option<RegimeAssessment> {
    let values = closes(candles);
    let ma_20 = sma(&values, 20)?;
    let ma_60 = sma(&values, 60).unwrap_or(ma_20);
    let price = *values.last()?;

    let returns: Vec<f64> = values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    let volatility = std_dev(&returns, true) * 252f64.sqrt();

    let (regime, confidence) = if price > ma_20 && price > ma_60 {
        (MarketRegime::Bull, 0.7)
    } else if price < ma_20 && price < ma_60 {
        (MarketRegime::Bear, 0.7)
    } else {
        (MarketRegime::Sideways, 0.5)
    };

    Some(RegimeAssessment {
        regime,
        confidence,
        volatility,
    })
}

/// Technical analyzer over daily bars
pub struct CandleTechnicalAnalyzer {
    source: Arc<dyn CandleSource>,
    lookback: usize,
}

impl CandleTechnicalAnalyzer {
    pub fn new(source: Arc<dyn CandleSource>, lookback: usize) -> Self {
        Self { source, lookback }
    }
}

#[async_trait]
impl TechnicalAnalyzer for CandleTechnicalAnalyzer {
    async fn analyze(&self, symbol: &str) -> AnalyzerResult<TechnicalSignals> {
        let candles = self.source.daily_candles(symbol, self.lookback).await?;
        if candles.is_empty() {
            return Err(CollaboratorError::invalid_data(
                "candles",
                format!("no bars for {}", symbol),
            ));
        }
        Ok(compute_indicators(&candles))
    }
}

/// Regime from the bars of a market index
pub struct TrendRegimeDetector {
    source: Arc<dyn CandleSource>,
    index_symbol: String,
    lookback: usize,
}

impl TrendRegimeDetector {
    pub fn new(source: Arc<dyn CandleSource>, index_symbol: impl Into<String>, lookback: usize) -> Self {
        Self {
            source,
            index_symbol: index_symbol.into(),
            lookback,
        }
    }
}

#[async_trait]
impl RegimeDetector for TrendRegimeDetector {
    async fn detect(&self) -> AnalyzerResult<RegimeAssessment> {
        let candles = self
            .source
            .daily_candles(&self.index_symbol, self.lookback)
            .await?;
        assess_regime(&candles).ok_or_else(|| {
            CollaboratorError::invalid_data(
                "regime",
                format!("not enough bars for {} ({})", self.index_symbol, candles.len()),
            )
        })
    }
}

/// Scores the latest filed statement seen on the bus
#[derive(Default)]
pub struct StatementFundamentalAnalyzer {
    statements: DashMap<String, FinancialStatement>,
}

impl StatementFundamentalAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, statement: FinancialStatement) {
        self.statements.insert(statement.symbol.clone(), statement);
    }

    /// One point per healthy ratio, scaled to -1.0 ..= 1.0
    pub fn score(statement: &FinancialStatement) -> FundamentalScore {
        let checks = [
            statement.per.map_or(false, |v| v > 5.0 && v < 25.0),
            statement.pbr.map_or(false, |v| v > 0.5 && v < 3.0),
            statement.roe.map_or(false, |v| v > 10.0),
        ];
        let hits = checks.iter().filter(|ok| **ok).count() as f64;
        FundamentalScore {
            per: statement.per,
            pbr: statement.pbr,
            roe: statement.roe,
            current_price: None,
            overall_score: hits / checks.len() as f64 * 2.0 - 1.0,
        }
    }
}

#[async_trait]
impl FundamentalAnalyzer for StatementFundamentalAnalyzer {
    async fn analyze(&self, symbol: &str) -> AnalyzerResult<FundamentalScore> {
        self.statements
            .get(symbol)
            .map(|s| Self::score(s.value()))
            .ok_or_else(|| CollaboratorError::unavailable("fundamentals", format!("no statement for {}", symbol)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Bars requested per analysis
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    /// Index used for regime detection
    #[serde(default = "default_regime_index")]
    pub regime_index: String,
}

fn default_lookback_days() -> usize {
    90
}

fn default_regime_index() -> String {
    "0001".to_string()
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            regime_index: default_regime_index(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalystStatus {
    pub running: bool,
    pub cached_reports: usize,
    pub analyzers: Vec<&'static str>,
}

pub struct AnalystAgent {
    config: AnalystConfig,
    bus: Arc<EventBus>,
    technical: Option<Arc<dyn TechnicalAnalyzer>>,
    fundamental: Option<Arc<dyn FundamentalAnalyzer>>,
    sentiment: Option<Arc<dyn SentimentAnalyzer>>,
    regime: Option<Arc<dyn RegimeDetector>>,
    statements: Option<Arc<StatementFundamentalAnalyzer>>,
    cache: DashMap<String, AnalysisReport>,
    running: AtomicBool,
}

impl AnalystAgent {
    pub fn new(config: AnalystConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            technical: None,
            fundamental: None,
            sentiment: None,
            regime: None,
            statements: None,
            cache: DashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Technical analysis and regime detection over one candle source
    pub fn with_candles(self, source: Arc<dyn CandleSource>) -> Self {
        let lookback = self.config.lookback_days;
        let index = self.config.regime_index.clone();
        self.with_technical(Arc::new(CandleTechnicalAnalyzer::new(Arc::clone(&source), lookback)))
            .with_regime(Arc::new(TrendRegimeDetector::new(source, index, lookback)))
    }

    pub fn with_technical(mut self, analyzer: Arc<dyn TechnicalAnalyzer>) -> Self {
        self.technical = Some(analyzer);
        self
    }

    pub fn with_fundamental(mut self, analyzer: Arc<dyn FundamentalAnalyzer>) -> Self {
        self.fundamental = Some(analyzer);
        self
    }

    /// Fundamental scores from `financial_statement_update` events
    pub fn with_statement_fundamentals(mut self) -> Self {
        let analyzer = Arc::new(StatementFundamentalAnalyzer::new());
        self.statements = Some(Arc::clone(&analyzer));
        self.fundamental = Some(analyzer);
        self
    }

    pub fn with_sentiment(mut self, analyzer: Arc<dyn SentimentAnalyzer>) -> Self {
        self.sentiment = Some(analyzer);
        self
    }

    pub fn with_regime(mut self, detector: Arc<dyn RegimeDetector>) -> Self {
        self.regime = Some(detector);
        self
    }

    /// Feed filed statements into the statement analyzer, if configured
    pub async fn subscribe_statements(&self) {
        let Some(statements) = &self.statements else {
            return;
        };
        let weak: Weak<StatementFundamentalAnalyzer> = Arc::downgrade(statements);
        self.bus
            .subscribe_fn(
                EventType::FinancialStatementUpdate,
                "analyst.statements",
                move |event| {
                    let weak = weak.clone();
                    async move {
                        if let (Some(analyzer), EventPayload::FinancialStatementUpdate(statement)) =
                            (weak.upgrade(), &event.payload)
                        {
                            analyzer.record(statement.clone());
                        }
                        Ok(None)
                    }
                },
            )
            .await;
    }

    pub async fn analyze_symbol(&self, symbol: &str) -> AnalysisReport {
        self.analyze_with_correlation(symbol, None).await
    }

    /// Run every configured analyzer, cache the report and publish it
    pub async fn analyze_with_correlation(&self, symbol: &str, correlation_id: Option<Uuid>) -> AnalysisReport {
        let mut report = AnalysisReport::empty(symbol);

        if let Some(analyzer) = &self.technical {
            report.technical = absent_on_error("technical", symbol, analyzer.analyze(symbol).await);
        }
        if let Some(analyzer) = &self.fundamental {
            report.fundamental = absent_on_error("fundamental", symbol, analyzer.analyze(symbol).await);
        }
        if let Some(analyzer) = &self.sentiment {
            report.sentiment = absent_on_error("sentiment", symbol, analyzer.analyze(symbol).await);
        }
        if let Some(detector) = &self.regime {
            report.regime = absent_on_error("regime", symbol, detector.detect().await);
        }

        let report = report.finalize();
        debug!(
            "Analysis for {}: {} (confidence {:.2})",
            symbol, report.overall_signal, report.confidence
        );
        self.cache.insert(symbol.to_string(), report.clone());

        self.bus
            .publish(
                Event::new(SOURCE, EventPayload::AnalysisReport(report.clone()))
                    .with_correlation(correlation_id),
            )
            .await;
        report
    }

    pub fn get_report(&self, symbol: &str) -> Option<AnalysisReport> {
        self.cache.get(symbol).map(|r| r.value().clone())
    }

    /// Most recent regime seen in any cached report
    pub fn latest_regime(&self) -> Option<RegimeAssessment> {
        self.cache
            .iter()
            .filter_map(|entry| {
                let report = entry.value();
                report.regime.clone().map(|r| (report.timestamp, r))
            })
            .max_by_key(|(at, _)| *at)
            .map(|(_, regime)| regime)
    }

    pub fn get_status(&self) -> AnalystStatus {
        let mut analyzers = Vec::new();
        if self.technical.is_some() {
            analyzers.push("technical");
        }
        if self.fundamental.is_some() {
            analyzers.push("fundamental");
        }
        if self.sentiment.is_some() {
            analyzers.push("sentiment");
        }
        if self.regime.is_some() {
            analyzers.push("regime");
        }
        AnalystStatus {
            running: self.running.load(Ordering::SeqCst),
            cached_reports: self.cache.len(),
            analyzers,
        }
    }
}

fn absent_on_error<T>(dimension: &str, symbol: &str, result: AnalyzerResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_transient() => {
            warn!("{} analysis for {} unavailable: {}", dimension, symbol, e);
            None
        }
        Err(e) => {
            error!("{} analysis for {} failed: {}", dimension, symbol, e);
            None
        }
    }
}

#[async_trait]
impl Agent for AnalystAgent {
    fn name(&self) -> &str {
        SOURCE
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::from_running(self.running.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Analyst Agent started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Analyst Agent stopped");
        Ok(())
    }
}

#[async_trait]
impl Analyzer for AnalystAgent {
    async fn analyze(&self, symbol: &str) -> Option<AnalysisReport> {
        Some(self.analyze_symbol(symbol).await)
    }

    async fn analyze_correlated(&self, symbol: &str, correlation_id: Option<Uuid>) -> Option<AnalysisReport> {
        Some(self.analyze_with_correlation(symbol, correlation_id).await)
    }

    async fn register(&self) {
        self.subscribe_statements().await;
    }

    fn into_agent(self: Arc<Self>) -> Arc<dyn Agent> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalDirection;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let close = Decimal::from_f64_retain(*close).unwrap_or_default();
                Candle {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1000,
                }
            })
            .collect()
    }

    struct FixedCandles(Vec<Candle>);

    #[async_trait]
    impl CandleSource for FixedCandles {
        async fn daily_candles(&self, _symbol: &str, limit: usize) -> AnalyzerResult<Vec<Candle>> {
            let skip = self.0.len().saturating_sub(limit);
            Ok(self.0[skip..].to_vec())
        }
    }

    struct DownSource;

    #[async_trait]
    impl CandleSource for DownSource {
        async fn daily_candles(&self, _symbol: &str, _limit: usize) -> AnalyzerResult<Vec<Candle>> {
            Err(CollaboratorError::unavailable("kis", "connection refused"))
        }
    }

    #[test]
    fn test_indicators_on_rising_series() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signals = compute_indicators(&candles_from(&closes));

        assert_eq!(signals.last_close, Some(159.0));
        assert_eq!(signals.rsi, Some(100.0));
        assert!(signals.macd_histogram.is_some());
        assert!((signals.sma_20.unwrap() - 149.5).abs() < 1e-9);
        assert!(signals.bb_upper.unwrap() > signals.bb_lower.unwrap());
        assert_eq!(signals.pattern, Some(TrendPattern::Uptrend));
    }

    #[test]
    fn test_short_history_leaves_indicators_absent() {
        let signals = compute_indicators(&candles_from(&[100.0, 99.0, 98.0]));
        assert_eq!(signals.last_close, Some(98.0));
        assert!(signals.rsi.is_none());
        assert!(signals.sma_20.is_none());
        assert!(signals.pattern.is_none());
    }

    #[test]
    fn test_regime_classification() {
        let rising: Vec<f64> = (0..70).map(|i| 100.0 + i as f64).collect();
        assert_eq!(assess_regime(&candles_from(&rising)).unwrap().regime, MarketRegime::Bull);

        let falling: Vec<f64> = (0..70).map(|i| 200.0 - i as f64).collect();
        let bear = assess_regime(&candles_from(&falling)).unwrap();
        assert_eq!(bear.regime, MarketRegime::Bear);
        assert!(bear.volatility > 0.0);

        assert!(assess_regime(&candles_from(&[1.0; 10])).is_none());
    }

    #[test]
    fn test_statement_score() {
        let statement = FinancialStatement {
            symbol: "005930".into(),
            fiscal_period: "2024Q4".into(),
            per: Some(12.0),
            pbr: Some(1.2),
            roe: Some(15.0),
            filed_on: NaiveDate::from_ymd_opt(2025, 3, 1),
        };
        assert_eq!(StatementFundamentalAnalyzer::score(&statement).overall_score, 1.0);

        let weak = FinancialStatement {
            per: Some(40.0),
            pbr: None,
            roe: Some(2.0),
            ..statement
        };
        assert_eq!(StatementFundamentalAnalyzer::score(&weak).overall_score, -1.0);
    }

    #[tokio::test]
    async fn test_failed_source_leaves_subscores_absent() {
        let bus = Arc::new(EventBus::new());
        let analyst = AnalystAgent::new(AnalystConfig::default(), Arc::clone(&bus))
            .with_candles(Arc::new(DownSource));

        let report = analyst.analyze_symbol("005930").await;
        assert!(report.technical.is_none());
        assert!(report.regime.is_none());
        assert_eq!(report.overall_signal, SignalDirection::Hold);
        assert_eq!(report.confidence, 0.0);
        assert!(analyst.get_report("005930").is_some());
    }

    #[tokio::test]
    async fn test_report_is_published_and_cached() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe_fn(EventType::AnalysisReport, "counter", move |_| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await;
        }
        let closes: Vec<f64> = (0..90).map(|i| 100.0 + i as f64).collect();
        let analyst = AnalystAgent::new(AnalystConfig::default(), Arc::clone(&bus))
            .with_candles(Arc::new(FixedCandles(candles_from(&closes))));

        let report = analyst.analyze_symbol("000660").await;
        assert!(report.technical.is_some());
        assert_eq!(report.regime.as_ref().unwrap().regime, MarketRegime::Bull);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(analyst.latest_regime().unwrap().regime, MarketRegime::Bull);
        assert_eq!(analyst.get_status().analyzers, vec!["technical", "regime"]);
    }

    #[tokio::test]
    async fn test_statements_flow_from_bus() {
        let bus = Arc::new(EventBus::new());
        let analyst = AnalystAgent::new(AnalystConfig::default(), Arc::clone(&bus))
            .with_statement_fundamentals();
        analyst.subscribe_statements().await;

        assert!(analyst.analyze_symbol("005930").await.fundamental.is_none());

        bus.publish(Event::new(
            "collector:dart",
            EventPayload::FinancialStatementUpdate(FinancialStatement {
                symbol: "005930".into(),
                fiscal_period: "2024Q4".into(),
                per: Some(12.0),
                pbr: Some(1.2),
                roe: Some(15.0),
                filed_on: NaiveDate::from_ymd_opt(2025, 3, 1),
            }),
        ))
        .await;

        let report = analyst.analyze_symbol("005930").await;
        assert_eq!(report.fundamental.unwrap().overall_score, 1.0);
        // Fundamental 1.0 alone averages to a BUY vote
        assert_eq!(report.overall_signal, SignalDirection::Buy);
        assert!((report.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_failed_dimension_is_absent() {
        assert_eq!(absent_on_error("technical", "005930", Ok(7)), Some(7));
        let transient: AnalyzerResult<i32> = Err(CollaboratorError::unavailable("candles", "timeout"));
        assert_eq!(absent_on_error("technical", "005930", transient), None);
        let permanent: AnalyzerResult<i32> = Err(CollaboratorError::invalid_data("news", "malformed body"));
        assert_eq!(absent_on_error("sentiment", "005930", permanent), None);
    }
}
