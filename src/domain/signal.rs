use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a trade signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalDirection::Hold)
    }
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalDirection::Buy => write!(f, "BUY"),
            SignalDirection::Sell => write!(f, "SELL"),
            SignalDirection::Hold => write!(f, "HOLD"),
        }
    }
}

/// How soon a signal should be acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Immediate,
    Today,
    ThisWeek,
}

impl Urgency {
    pub fn from_strength(strength: f64) -> Self {
        if strength >= 0.8 {
            Urgency::Immediate
        } else if strength >= 0.6 {
            Urgency::Today
        } else {
            Urgency::ThisWeek
        }
    }

    /// Ranking multiplier applied by the strategist
    pub fn rank_multiplier(&self) -> f64 {
        match self {
            Urgency::Immediate => 1.5,
            Urgency::Today => 1.2,
            Urgency::ThisWeek => 1.0,
        }
    }
}

/// Market-condition classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketRegime {
    Bull,
    Bear,
    #[default]
    Sideways,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketRegime::Bull => write!(f, "BULL"),
            MarketRegime::Bear => write!(f, "BEAR"),
            MarketRegime::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    Aggressive,
    Neutral,
    Defensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskPosture {
    Low,
    Medium,
    High,
}

/// Regime-driven allocation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentThesis {
    pub regime: MarketRegime,
    pub mode: TradingMode,
    pub cash_target_pct: Decimal,
    pub sector_allocation: BTreeMap<String, Decimal>,
    pub risk_posture: RiskPosture,
}

impl InvestmentThesis {
    pub fn for_regime(regime: MarketRegime) -> Self {
        let (mode, cash_target_pct, risk_posture, weights) = match regime {
            MarketRegime::Bull => (
                TradingMode::Aggressive,
                dec!(0.10),
                RiskPosture::High,
                [dec!(0.25), dec!(0.20), dec!(0.15), dec!(0.15), dec!(0.25)],
            ),
            MarketRegime::Bear => (
                TradingMode::Defensive,
                dec!(0.40),
                RiskPosture::Low,
                [dec!(0.10), dec!(0.15), dec!(0.20), dec!(0.10), dec!(0.45)],
            ),
            MarketRegime::Sideways => (
                TradingMode::Neutral,
                dec!(0.20),
                RiskPosture::Medium,
                [dec!(0.15), dec!(0.15), dec!(0.15), dec!(0.10), dec!(0.45)],
            ),
        };

        let sector_allocation = ["technology", "consumer", "finance", "energy", "etc"]
            .into_iter()
            .map(String::from)
            .zip(weights)
            .collect();

        Self {
            regime,
            mode,
            cash_target_pct,
            sector_allocation,
            risk_posture,
        }
    }
}

impl Default for InvestmentThesis {
    fn default() -> Self {
        Self::for_regime(MarketRegime::Sideways)
    }
}

/// An actionable (or HOLD) view on one symbol produced by a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub direction: SignalDirection,
    /// 0.0 ..= 1.0
    pub strength: f64,
    pub target_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub strategy_name: String,
    pub reasoning: String,
    pub max_position_pct: Decimal,
    pub urgency: Urgency,
    pub created_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn new(symbol: impl Into<String>, direction: SignalDirection, strength: f64) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            strength: strength.clamp(0.0, 1.0),
            target_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            strategy_name: String::new(),
            reasoning: String::new(),
            max_position_pct: dec!(0.05),
            urgency: Urgency::from_strength(strength),
            created_at: Utc::now(),
        }
    }
}
