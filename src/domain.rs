// ===============================
// src/domain.rs
// ===============================
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, Result};

pub const USD: &str = "USD";

fn valid_part(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

/// A security on a specific venue. Same ticker on two exchanges = two instruments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    ticker: String,
    exchange: String,
}

impl Instrument {
    pub fn new(ticker: &str, exchange: &str) -> Result<Self> {
        let ticker = ticker.trim().to_ascii_uppercase();
        let exchange = exchange.trim().to_ascii_uppercase();
        if !valid_part(&ticker) || !valid_part(&exchange) {
            return Err(PortfolioError::InvalidInput(format!(
                "malformed instrument '{ticker}:{exchange}'"
            )));
        }
        Ok(Self { ticker, exchange })
    }

    pub fn ticker(&self) -> &str { &self.ticker }
    pub fn exchange(&self) -> &str { &self.exchange }

    /// Identifier handed to the quote source, e.g. `SHOP:TSE`.
    pub fn symbol_id(&self) -> String {
        format!("{}:{}", self.ticker, self.exchange)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ticker, self.exchange)
    }
}

/// Raw answer of a quote source: last price in the listing currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote { pub price: Decimal, pub currency: String }

/// Price normalised to USD. Built only by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub native_price: Decimal,
    pub currency: String,
    pub usd_price: Decimal,
}

/// Unresolved holding: what the caller asks for, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingSpec { pub instrument: Instrument, pub quantity: u64 }

impl HoldingSpec {
    pub fn new(instrument: Instrument, quantity: u64) -> Self {
        Self { instrument, quantity }
    }
}

// TICKER:EXCHANGE:QTY
impl FromStr for HoldingSpec {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let [ticker, exchange, qty] = parts.as_slice() else {
            return Err(PortfolioError::InvalidInput(format!(
                "expected TICKER:EXCHANGE:QTY, got '{s}'"
            )));
        };
        let instrument = Instrument::new(ticker, exchange)?;
        let quantity = qty.trim().parse::<u64>().map_err(|_| {
            PortfolioError::InvalidInput(format!(
                "quantity must be a non-negative integer, got '{}'",
                qty.trim()
            ))
        })?;
        Ok(Self { instrument, quantity })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub instrument: Instrument,
    pub quantity: u64,
    pub price: ResolvedPrice,
}

impl Holding {
    /// `quantity * usd_price`; `Overflow` past Decimal range.
    pub fn market_value(&self) -> Result<Decimal> {
        Decimal::from(self.quantity)
            .checked_mul(self.price.usd_price)
            .ok_or_else(|| {
                PortfolioError::Overflow(format!(
                    "{} x {} for {}",
                    self.quantity, self.price.usd_price, self.instrument
                ))
            })
    }
}

/// One line of the valuation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub ticker: String,
    pub exchange: String,
    pub quantity: u64,
    pub usd_price: Decimal,
    pub market_value: Decimal,
    pub allocation_percent: Decimal,
}
