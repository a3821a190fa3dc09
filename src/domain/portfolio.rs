use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A holding in one symbol. Derived fields are maintained by [`Portfolio`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub weight: Decimal,
}

impl Position {
    fn new(symbol: &str, quantity: u64, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            avg_price: price,
            current_price: price,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            weight: Decimal::ZERO,
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        Decimal::from(self.quantity) * self.avg_price
    }
}

/// Why a fill could not be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FillRejection {
    #[error("insufficient cash: required {required}, available {available}")]
    InsufficientCash { required: Decimal, available: Decimal },
    #[error("insufficient quantity for {symbol}: held {held}, requested {requested}")]
    InsufficientQuantity { symbol: String, held: u64, requested: u64 },
    #[error("zero quantity")]
    ZeroQuantity,
}

/// Result of applying an executed order to the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FillOutcome {
    Applied { realized_pnl: Decimal },
    Skipped { reason: String },
}

impl FillOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FillOutcome::Applied { .. })
    }

    pub fn realized_pnl(&self) -> Decimal {
        match self {
            FillOutcome::Applied { realized_pnl } => *realized_pnl,
            FillOutcome::Skipped { .. } => Decimal::ZERO,
        }
    }
}

/// Cash plus positions.
///
/// After every mutation `total_value == cash + Σ market_value` and each
/// `weight == market_value / total_value`. Positions whose quantity reaches
/// zero are removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub total_value: Decimal,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(cash: Decimal) -> Self {
        let mut portfolio = Self {
            total_value: cash,
            cash,
            positions: BTreeMap::new(),
            updated_at: Utc::now(),
        };
        portfolio.recompute();
        portfolio
    }

    /// Seed a holding (used when loading an existing account)
    pub fn with_position(mut self, symbol: &str, quantity: u64, avg_price: Decimal, current_price: Decimal) -> Self {
        if quantity > 0 {
            let mut position = Position::new(symbol, quantity, avg_price);
            position.current_price = current_price;
            self.positions.insert(symbol.to_string(), position);
        }
        self.recompute();
        self
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn weight_of(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.weight)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn invested_value(&self) -> Decimal {
        self.positions.values().map(|p| p.market_value).sum()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Current market value per symbol
    pub fn position_values(&self) -> HashMap<String, Decimal> {
        self.positions
            .iter()
            .map(|(symbol, p)| (symbol.clone(), p.market_value))
            .collect()
    }

    /// Buy `quantity` at `price`; a no-op error when cash does not cover the cost
    pub fn apply_buy(&mut self, symbol: &str, quantity: u64, price: Decimal) -> Result<(), FillRejection> {
        if quantity == 0 {
            return Err(FillRejection::ZeroQuantity);
        }
        let cost = Decimal::from(quantity) * price;
        if cost > self.cash {
            return Err(FillRejection::InsufficientCash {
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;
        match self.positions.get_mut(symbol) {
            Some(position) => {
                let new_quantity = position.quantity + quantity;
                position.avg_price =
                    (position.cost_basis() + cost) / Decimal::from(new_quantity);
                position.quantity = new_quantity;
                position.current_price = price;
            }
            None => {
                self.positions
                    .insert(symbol.to_string(), Position::new(symbol, quantity, price));
            }
        }
        self.recompute();
        Ok(())
    }

    /// Sell `quantity` at `price`, returning realized P&L
    pub fn apply_sell(&mut self, symbol: &str, quantity: u64, price: Decimal) -> Result<Decimal, FillRejection> {
        if quantity == 0 {
            return Err(FillRejection::ZeroQuantity);
        }
        let held = self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0);
        if held < quantity {
            return Err(FillRejection::InsufficientQuantity {
                symbol: symbol.to_string(),
                held,
                requested: quantity,
            });
        }

        let mut realized = Decimal::ZERO;
        if let Some(position) = self.positions.get_mut(symbol) {
            realized = (price - position.avg_price) * Decimal::from(quantity);
            position.quantity -= quantity;
            position.current_price = price;
        }
        self.cash += Decimal::from(quantity) * price;
        self.recompute();
        Ok(realized)
    }

    /// Mark positions to the given prices; unknown symbols are ignored
    pub fn mark_prices(&mut self, prices: &HashMap<String, Decimal>) {
        for (symbol, price) in prices {
            if let Some(position) = self.positions.get_mut(symbol) {
                position.current_price = *price;
            }
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        self.positions.retain(|_, p| p.quantity > 0);

        for position in self.positions.values_mut() {
            let quantity = Decimal::from(position.quantity);
            position.market_value = quantity * position.current_price;
            position.unrealized_pnl = (position.current_price - position.avg_price) * quantity;
        }

        self.total_value = self.cash + self.invested_value();
        let total = self.total_value;
        for position in self.positions.values_mut() {
            position.weight = if total.is_zero() {
                Decimal::ZERO
            } else {
                position.market_value / total
            };
        }
        self.updated_at = Utc::now();
    }
}
