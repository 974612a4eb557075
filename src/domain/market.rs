use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CrossmakerError, Result};

/// A `BASE-QUOTE` market identifier (e.g. `ETH-USDT`).
///
/// Always holds exactly two nonempty alphanumeric tickers, uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair {
    base: String,
    quote: String,
}

impl TradingPair {
    pub fn new(base: &str, quote: &str) -> Result<Self> {
        for ticker in [base, quote] {
            let ticker = ticker.trim();
            if ticker.is_empty() {
                return Err(CrossmakerError::Validation(
                    "market ticker has an invalid length".to_string(),
                ));
            }
            if !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(CrossmakerError::Validation(format!(
                    "market ticker {ticker} contains invalid characters"
                )));
            }
        }
        Ok(Self {
            base: base.trim().to_ascii_uppercase(),
            quote: quote.trim().to_ascii_uppercase(),
        })
    }

    /// The left-hand token.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The right-hand token.
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl FromStr for TradingPair {
    type Err = CrossmakerError;

    fn from_str(raw: &str) -> Result<Self> {
        let tokens: Vec<&str> = raw.trim().split('-').collect();
        if tokens.len() != 2 {
            return Err(CrossmakerError::Validation(format!(
                "market {raw} doesn't contain exactly 2 tickers"
            )));
        }
        Self::new(tokens[0], tokens[1])
    }
}

impl TryFrom<String> for TradingPair {
    type Error = CrossmakerError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// An order price and size. A zero size means "do not place".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSize {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceSize {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

impl fmt::Display for PriceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ p: {} s: {} ]", self.price, self.size)
    }
}

/// A symmetric maker proposal for one market: one buy and one sell leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub market: TradingPair,
    pub buy: PriceSize,
    pub sell: PriceSize,
}

impl Proposal {
    pub fn new(market: TradingPair, buy: PriceSize, sell: PriceSize) -> Self {
        Self { market, buy, sell }
    }

    pub fn base(&self) -> &str {
        self.market.base()
    }

    pub fn quote(&self) -> &str {
        self.market.quote()
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} buy: {} sell: {}", self.market, self.buy, self.sell)
    }
}

/// Fee schedule entry for a hypothetical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFee {
    /// Fee as a fraction of notional (0.001 = 0.1%).
    pub percent: Decimal,
}

impl TradeFee {
    pub fn new(percent: Decimal) -> Self {
        Self { percent }
    }
}
