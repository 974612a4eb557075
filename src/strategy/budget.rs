//! Per-market budget allocation
//!
//! Partitions the trader's total portfolio value (denominated in the
//! campaign token) equally across markets and tracks per-market buy/sell
//! budgets. Budgets are created once at readiness and afterwards updated
//! only by fills, so the book stays in sync between reallocations.

use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::domain::{TradeType, TradingPair};
use crate::error::{CrossmakerError, Result};
use crate::gateway::MarketGateway;

pub struct BudgetBook {
    token: String,
    buy_budgets: HashMap<TradingPair, Decimal>,
    sell_budgets: HashMap<TradingPair, Decimal>,
}

impl BudgetBook {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_ascii_uppercase(),
            buy_budgets: HashMap::new(),
            sell_budgets: HashMap::new(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Quote budget (in quote units) available for buys on a market.
    pub fn buy_budget(&self, market: &TradingPair) -> Decimal {
        self.buy_budgets.get(market).copied().unwrap_or(Decimal::ZERO)
    }

    /// Base budget (in base units) available for sells on a market.
    pub fn sell_budget(&self, market: &TradingPair) -> Decimal {
        self.sell_budgets.get(market).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn buy_budgets(&self) -> &HashMap<TradingPair, Decimal> {
        &self.buy_budgets
    }

    pub fn sell_budgets(&self) -> &HashMap<TradingPair, Decimal> {
        &self.sell_budgets
    }

    /// Whether the campaign token is the single quote token of all markets.
    /// With mixed quotes the token is treated as a base asset.
    pub fn is_token_quote(&self, markets: &[TradingPair]) -> bool {
        let quotes: BTreeSet<&str> = markets.iter().map(|m| m.quote()).collect();
        quotes.len() == 1 && quotes.contains(self.token.as_str())
    }

    /// Every token (base and quote) involved in the given markets.
    pub fn all_tokens(markets: &[TradingPair]) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        for market in markets {
            tokens.insert(market.base().to_string());
            tokens.insert(market.quote().to_string());
        }
        tokens
    }

    /// Available balances augmented by the amounts locked in live orders:
    /// buys add their quote value back, sells their base quantity. This is
    /// the balance view presented to the strategy, covering funds already
    /// committed to existing quotes.
    pub fn adjusted_available_balances(
        gateway: &dyn MarketGateway,
        markets: &[TradingPair],
    ) -> HashMap<String, Decimal> {
        let mut balances: HashMap<String, Decimal> = Self::all_tokens(markets)
            .into_iter()
            .map(|token| {
                let available = gateway.get_available_balance(&token);
                (token, available)
            })
            .collect();
        for order in gateway.limit_orders() {
            if !markets.contains(&order.trading_pair) {
                continue;
            }
            if order.is_buy {
                *balances
                    .entry(order.trading_pair.quote().to_string())
                    .or_default() += order.quantity * order.price;
            } else {
                *balances
                    .entry(order.trading_pair.base().to_string())
                    .or_default() += order.quantity;
            }
        }
        balances
    }

    /// Total portfolio value in the campaign token across all markets.
    pub fn total_portfolio_value(
        &self,
        gateway: &dyn MarketGateway,
        markets: &[TradingPair],
    ) -> Result<Decimal> {
        let balances = Self::adjusted_available_balances(gateway, markets);
        let token_is_quote = self.is_token_quote(markets);
        let mut port_value = balances.get(&self.token).copied().unwrap_or(Decimal::ZERO);
        for market in markets {
            let mid = Self::mid_price(gateway, market)?;
            if token_is_quote {
                let base = balances.get(market.base()).copied().unwrap_or(Decimal::ZERO);
                port_value += base * mid;
            } else {
                let quote = balances.get(market.quote()).copied().unwrap_or(Decimal::ZERO);
                port_value += quote / mid;
            }
        }
        Ok(port_value)
    }

    /// Create buy and sell budgets for every market, partitioning portfolio
    /// value equally.
    pub fn allocate(&mut self, gateway: &dyn MarketGateway, markets: &[TradingPair]) -> Result<()> {
        if markets.is_empty() {
            return Err(CrossmakerError::InvariantViolation(
                "budget allocation requires at least one market".to_string(),
            ));
        }
        self.buy_budgets = markets.iter().map(|m| (m.clone(), Decimal::ZERO)).collect();
        self.sell_budgets = markets.iter().map(|m| (m.clone(), Decimal::ZERO)).collect();

        let portfolio_value = self.total_portfolio_value(gateway, markets)?;
        let market_portion = portfolio_value / Decimal::from(markets.len() as u64);
        let balances = Self::adjusted_available_balances(gateway, markets);
        let token_is_quote = self.is_token_quote(markets);

        for market in markets {
            let mid = Self::mid_price(gateway, market)?;
            if token_is_quote {
                let base = balances.get(market.base()).copied().unwrap_or(Decimal::ZERO);
                self.sell_budgets.insert(market.clone(), base);
                let buy_budget = market_portion - base * mid;
                if buy_budget > Decimal::ZERO {
                    self.buy_budgets.insert(market.clone(), buy_budget);
                }
            } else {
                let quote = balances.get(market.quote()).copied().unwrap_or(Decimal::ZERO);
                self.buy_budgets.insert(market.clone(), quote);
                let sell_budget = market_portion - quote / mid;
                if sell_budget > Decimal::ZERO {
                    self.sell_budgets.insert(market.clone(), sell_budget);
                }
            }
            debug!(
                market = %market,
                buy_budget = %self.buy_budget(market),
                sell_budget = %self.sell_budget(market),
                "budget allocated"
            );
        }
        Ok(())
    }

    /// Apply a confirmed own-trade to the budgets.
    pub fn apply_fill(
        &mut self,
        market: &TradingPair,
        trade_type: TradeType,
        amount: Decimal,
        price: Decimal,
    ) {
        match trade_type {
            TradeType::Buy => {
                *self.buy_budgets.entry(market.clone()).or_default() -= amount * price;
                *self.sell_budgets.entry(market.clone()).or_default() += amount;
            }
            TradeType::Sell => {
                *self.sell_budgets.entry(market.clone()).or_default() -= amount;
                *self.buy_budgets.entry(market.clone()).or_default() += amount * price;
            }
        }
    }

    fn mid_price(gateway: &dyn MarketGateway, market: &TradingPair) -> Result<Decimal> {
        let mid = gateway.get_mid_price(market).ok_or_else(|| {
            CrossmakerError::InvariantViolation(format!("{market} has no mid price"))
        })?;
        if mid <= Decimal::ZERO {
            return Err(CrossmakerError::InvariantViolation(format!(
                "{market} mid price {mid} is not positive"
            )));
        }
        Ok(mid)
    }
}
