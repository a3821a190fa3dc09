//! Signal strategies
//!
//! Pure functions of an analysis report and the current thesis. Prices are
//! derived from the report's reference price; when the report carries no
//! price, the signal has no price targets.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::traits::Strategy;
use crate::domain::{AnalysisReport, InvestmentThesis, SignalDirection, TradeSignal, TrendPattern};

fn price(base: Option<f64>, factor: f64) -> Option<Decimal> {
    base.and_then(|p| Decimal::from_f64_retain(p * factor))
        .map(|d| d.round_dp(2))
}

fn build_signal(
    report: &AnalysisReport,
    strategy: &str,
    direction: SignalDirection,
    strength: f64,
    reasons: &[String],
    targets: (Option<Decimal>, Option<Decimal>, Option<Decimal>),
    max_position_pct: Decimal,
) -> TradeSignal {
    let mut signal = TradeSignal::new(report.symbol.clone(), direction, strength.min(1.0));
    signal.target_price = targets.0;
    signal.stop_loss_price = targets.1;
    signal.take_profit_price = targets.2;
    signal.strategy_name = strategy.to_string();
    signal.reasoning = reasons.join(", ");
    signal.max_position_pct = max_position_pct;
    signal
}

/// Buys moderate-RSI names with rising MACD and an uptrend
#[derive(Debug, Default)]
pub struct MomentumStrategy;

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        "Momentum"
    }

    fn generate(&self, report: &AnalysisReport, _thesis: Option<&InvestmentThesis>) -> Option<TradeSignal> {
        let technical = report.technical.as_ref();
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        if let Some(rsi) = technical.and_then(|t| t.rsi) {
            if rsi > 40.0 && rsi < 70.0 {
                score += 0.3;
                reasons.push(format!("RSI moderate ({:.1})", rsi));
            } else if rsi < 30.0 {
                score -= 0.3;
                reasons.push(format!("RSI oversold ({:.1})", rsi));
            }
        }

        if let Some(hist) = technical.and_then(|t| t.macd_histogram) {
            if hist > 0.0 {
                score += 0.4;
                reasons.push("MACD rising".to_string());
            } else {
                score -= 0.2;
                reasons.push("MACD falling".to_string());
            }
        }

        match technical.and_then(|t| t.pattern) {
            Some(TrendPattern::Uptrend) => {
                score += 0.3;
                reasons.push("uptrend".to_string());
            }
            Some(TrendPattern::Downtrend) => {
                score -= 0.3;
                reasons.push("downtrend".to_string());
            }
            _ => {}
        }

        if report
            .sentiment
            .as_ref()
            .is_some_and(|s| s.sentiment_ratio > 0.2)
        {
            score += 0.2;
            reasons.push("positive sentiment".to_string());
        }

        if score < 0.1 {
            return None;
        }

        let strength = score.min(1.0);
        let base = report.reference_price();
        let target = price(base, 1.0 + strength * 0.1);
        Some(build_signal(
            report,
            self.name(),
            SignalDirection::Buy,
            strength,
            &reasons,
            (target, price(base, 0.97), target.map(|t| (t * dec!(1.02)).round_dp(2))),
            dec!(0.08),
        ))
    }
}

/// Buys cheap, profitable companies
#[derive(Debug, Default)]
pub struct ValueStrategy;

impl Strategy for ValueStrategy {
    fn name(&self) -> &str {
        "Value"
    }

    fn generate(&self, report: &AnalysisReport, _thesis: Option<&InvestmentThesis>) -> Option<TradeSignal> {
        let fundamental = report.fundamental.as_ref()?;
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        if let Some(per) = fundamental.per {
            if per > 5.0 && per < 15.0 {
                score += 0.4;
                reasons.push(format!("PER low ({:.1})", per));
            } else if (15.0..25.0).contains(&per) {
                score += 0.2;
                reasons.push(format!("PER moderate ({:.1})", per));
            }
        }
        if let Some(pbr) = fundamental.pbr {
            if pbr > 0.5 && pbr < 1.5 {
                score += 0.3;
                reasons.push(format!("PBR low ({:.1})", pbr));
            }
        }
        if let Some(roe) = fundamental.roe {
            if roe > 15.0 {
                score += 0.3;
                reasons.push(format!("ROE high ({:.1}%)", roe));
            }
        }

        if score < 0.3 {
            return None;
        }

        let base = fundamental.current_price.or_else(|| report.reference_price());
        let target = price(base, 1.15);
        Some(build_signal(
            report,
            self.name(),
            SignalDirection::Buy,
            score,
            &reasons,
            (target, price(base, 0.95), target),
            dec!(0.10),
        ))
    }
}

/// Trades RSI extremes back toward the mean
#[derive(Debug, Default)]
pub struct MeanReversionStrategy;

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "MeanReversion"
    }

    fn generate(&self, report: &AnalysisReport, _thesis: Option<&InvestmentThesis>) -> Option<TradeSignal> {
        let technical = report.technical.as_ref()?;
        let rsi = technical.rsi?;
        let mut reasons = Vec::new();

        let direction = if rsi < 30.0 {
            reasons.push(format!("RSI oversold ({:.1})", rsi));
            SignalDirection::Buy
        } else if rsi > 70.0 {
            reasons.push(format!("RSI overbought ({:.1})", rsi));
            SignalDirection::Sell
        } else {
            return None;
        };
        let mut score: f64 = 0.6;

        let current = technical.last_close.or(technical.sma_20);
        if let Some(current) = current {
            if technical.bb_lower.is_some_and(|lower| current < lower * 1.05) {
                score += 0.3;
                reasons.push("below Bollinger lower band".to_string());
            } else if technical.bb_upper.is_some_and(|upper| current > upper * 0.95) {
                score += 0.3;
                reasons.push("above Bollinger upper band".to_string());
            }
        }

        let (target, stop) = match direction {
            SignalDirection::Buy => (price(current, 1.08), price(current, 0.97)),
            _ => (price(current, 0.92), price(current, 1.03)),
        };
        Some(build_signal(
            report,
            self.name(),
            direction,
            score,
            &reasons,
            (target, stop, target),
            dec!(0.05),
        ))
    }
}

/// Majority vote over the other strategies
pub struct CompositeStrategy {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for CompositeStrategy {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(MomentumStrategy),
                Box::new(ValueStrategy),
                Box::new(MeanReversionStrategy),
            ],
        }
    }
}

impl CompositeStrategy {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }
}

impl Strategy for CompositeStrategy {
    fn name(&self) -> &str {
        "Composite"
    }

    fn generate(&self, report: &AnalysisReport, thesis: Option<&InvestmentThesis>) -> Option<TradeSignal> {
        let signals: Vec<TradeSignal> = self
            .strategies
            .iter()
            .filter_map(|s| s.generate(report, thesis))
            .collect();
        if signals.is_empty() {
            return None;
        }

        let avg_strength = signals.iter().map(|s| s.strength).sum::<f64>() / signals.len() as f64;
        let buys = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Buy)
            .count();
        let sells = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Sell)
            .count();
        // Ties go to BUY: every contributing strength is positive
        let direction = if sells > buys {
            SignalDirection::Sell
        } else {
            SignalDirection::Buy
        };

        let best = signals
            .iter()
            .max_by(|a, b| a.strength.total_cmp(&b.strength))?;
        let names: Vec<&str> = signals.iter().map(|s| s.strategy_name.as_str()).collect();

        let mut signal = build_signal(
            report,
            self.name(),
            direction,
            avg_strength,
            &[format!("Composite: {}", names.join(", "))],
            (best.target_price, best.stop_loss_price, best.take_profit_price),
            dec!(0.08),
        );
        signal.urgency = best.urgency;
        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FundamentalScore, SentimentScore, TechnicalSignals, Urgency};

    fn report_with(technical: Option<TechnicalSignals>, fundamental: Option<FundamentalScore>) -> AnalysisReport {
        let mut report = AnalysisReport::empty("005930");
        report.technical = technical;
        report.fundamental = fundamental;
        report
    }

    #[test]
    fn test_momentum_buy() {
        let report = report_with(
            Some(TechnicalSignals {
                last_close: Some(70000.0),
                rsi: Some(55.0),
                macd_histogram: Some(10.0),
                pattern: Some(TrendPattern::Uptrend),
                ..Default::default()
            }),
            None,
        );
        let signal = MomentumStrategy.generate(&report, None).unwrap();
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert!((signal.strength - 1.0).abs() < 1e-9);
        assert_eq!(signal.urgency, Urgency::Immediate);
        assert_eq!(signal.target_price, Some(dec!(77000)));
        assert_eq!(signal.stop_loss_price, Some(dec!(67900)));
        assert_eq!(signal.max_position_pct, dec!(0.08));
    }

    #[test]
    fn test_momentum_strength_is_capped() {
        let mut report = report_with(
            Some(TechnicalSignals {
                last_close: Some(70000.0),
                rsi: Some(55.0),
                macd_histogram: Some(10.0),
                pattern: Some(TrendPattern::Uptrend),
                ..Default::default()
            }),
            None,
        );
        report.sentiment = Some(SentimentScore::from_counts(8, 1, 1));

        let signal = MomentumStrategy.generate(&report, None).unwrap();
        assert_eq!(signal.strength, 1.0);
        assert!(signal.reasoning.contains("positive sentiment"));
        assert_eq!(signal.target_price, Some(dec!(77000)));
    }

    #[test]
    fn test_momentum_without_price_has_no_targets() {
        let report = report_with(
            Some(TechnicalSignals {
                macd_histogram: Some(10.0),
                ..Default::default()
            }),
            None,
        );
        let signal = MomentumStrategy.generate(&report, None).unwrap();
        assert!(signal.target_price.is_none());
        assert!(signal.stop_loss_price.is_none());
    }

    #[test]
    fn test_momentum_weak_is_none() {
        let report = report_with(
            Some(TechnicalSignals {
                rsi: Some(25.0),
                macd_histogram: Some(-1.0),
                ..Default::default()
            }),
            None,
        );
        assert!(MomentumStrategy.generate(&report, None).is_none());
    }

    #[test]
    fn test_value_requires_fundamentals() {
        assert!(ValueStrategy.generate(&report_with(None, None), None).is_none());

        let report = report_with(
            None,
            Some(FundamentalScore {
                per: Some(10.0),
                pbr: Some(1.0),
                roe: Some(18.0),
                current_price: Some(50000.0),
                overall_score: 1.0,
            }),
        );
        let signal = ValueStrategy.generate(&report, None).unwrap();
        assert!((signal.strength - 1.0).abs() < 1e-9);
        assert_eq!(signal.target_price, Some(dec!(57500)));
    }

    #[test]
    fn test_mean_reversion_sell_on_overbought() {
        let report = report_with(
            Some(TechnicalSignals {
                last_close: Some(100.0),
                rsi: Some(80.0),
                bb_upper: Some(101.0),
                ..Default::default()
            }),
            None,
        );
        let signal = MeanReversionStrategy.generate(&report, None).unwrap();
        assert_eq!(signal.direction, SignalDirection::Sell);
        assert!((signal.strength - 0.9).abs() < 1e-9);
        assert_eq!(signal.target_price, Some(dec!(92)));

        let neutral = report_with(
            Some(TechnicalSignals {
                rsi: Some(50.0),
                ..Default::default()
            }),
            None,
        );
        assert!(MeanReversionStrategy.generate(&neutral, None).is_none());
    }

    #[test]
    fn test_composite_majority() {
        // Momentum (weak buy) and MeanReversion (buy) agree
        let report = report_with(
            Some(TechnicalSignals {
                last_close: Some(100.0),
                rsi: Some(25.0),
                macd_histogram: Some(5.0),
                pattern: Some(TrendPattern::Uptrend),
                bb_lower: Some(99.0),
                ..Default::default()
            }),
            None,
        );
        let signal = CompositeStrategy::default().generate(&report, None).unwrap();
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert_eq!(signal.strategy_name, "Composite");
        assert!(signal.reasoning.contains("MeanReversion"));
        assert_eq!(signal.urgency, Urgency::Immediate);
    }
}
