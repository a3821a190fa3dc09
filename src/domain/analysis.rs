use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::{MarketRegime, SignalDirection};

/// Short-term price pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendPattern {
    Uptrend,
    Downtrend,
    Sideways,
}

/// Indicator values computed from price bars. Any indicator may be absent
/// when there is not enough history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSignals {
    pub last_close: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub sma_20: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub pattern: Option<TrendPattern>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalScore {
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    /// Return on equity in percent
    pub roe: Option<f64>,
    pub current_price: Option<f64>,
    /// -1.0 ..= 1.0
    pub overall_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    /// (positive - negative) / total, -1.0 ..= 1.0
    pub sentiment_ratio: f64,
}

impl SentimentScore {
    pub fn from_counts(positive: u32, negative: u32, neutral: u32) -> Self {
        let total = positive + negative + neutral;
        let sentiment_ratio = if total == 0 {
            0.0
        } else {
            (positive as f64 - negative as f64) / total as f64
        };
        Self {
            positive,
            negative,
            neutral,
            sentiment_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAssessment {
    pub regime: MarketRegime,
    pub confidence: f64,
    /// Annualized volatility of daily returns
    pub volatility: f64,
}

impl Default for RegimeAssessment {
    fn default() -> Self {
        Self {
            regime: MarketRegime::Sideways,
            confidence: 0.0,
            volatility: 0.0,
        }
    }
}

/// Best-effort analysis of one symbol. Sub-scores that could not be
/// produced are `None`, never filled with placeholder values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub technical: Option<TechnicalSignals>,
    pub fundamental: Option<FundamentalScore>,
    pub sentiment: Option<SentimentScore>,
    pub regime: Option<RegimeAssessment>,
    pub overall_signal: SignalDirection,
    pub confidence: f64,
}

impl AnalysisReport {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: Utc::now(),
            technical: None,
            fundamental: None,
            sentiment: None,
            regime: None,
            overall_signal: SignalDirection::Hold,
            confidence: 0.0,
        }
    }

    /// Reference price from whichever sub-score carries one
    pub fn reference_price(&self) -> Option<f64> {
        self.technical
            .as_ref()
            .and_then(|t| t.last_close.or(t.sma_20))
            .or_else(|| self.fundamental.as_ref().and_then(|f| f.current_price))
    }

    /// Recompute the aggregate vote and confidence from the present sub-scores
    pub fn finalize(mut self) -> Self {
        let mut score = 0.0;
        let mut count = 0u32;

        if let Some(technical) = &self.technical {
            if let Some(rsi) = technical.rsi {
                if rsi < 30.0 {
                    score += 1.0;
                } else if rsi > 70.0 {
                    score -= 1.0;
                }
                count += 1;
            }
            if let Some(hist) = technical.macd_histogram {
                score += if hist > 0.0 { 1.0 } else { -1.0 };
                count += 1;
            }
        }
        if let Some(fundamental) = &self.fundamental {
            score += fundamental.overall_score;
            count += 1;
        }
        if let Some(sentiment) = &self.sentiment {
            score += sentiment.sentiment_ratio * 2.0;
            count += 1;
        }

        self.overall_signal = if count == 0 {
            SignalDirection::Hold
        } else {
            let avg = score / count as f64;
            if avg >= 0.5 {
                SignalDirection::Buy
            } else if avg <= -0.5 {
                SignalDirection::Sell
            } else {
                SignalDirection::Hold
            }
        };

        let mut confidence: f64 = 0.0;
        if self.technical.is_some() {
            confidence += 0.4;
        }
        if self.fundamental.is_some() {
            confidence += 0.3;
        }
        if self.sentiment.is_some() {
            confidence += 0.3;
        }
        self.confidence = confidence.min(1.0);
        self
    }
}
