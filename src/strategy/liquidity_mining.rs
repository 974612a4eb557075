//! Liquidity-mining market maker
//!
//! Per-tick maker that quotes symmetric bid/ask pairs on many spot markets,
//! sizing and skewing orders against the rolling volatility and inventory
//! model while respecting a shared per-token budget. One tick runs
//! observe -> price -> size -> reconcile -> dispatch; cancellations are
//! always issued before placements on the same market.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LiquidityMiningConfig;
use crate::domain::{
    LimitOrder, OrderFilledEvent, OrderType, PriceSize, Proposal, TradeType, TradingPair,
};
use crate::error::{CrossmakerError, Result};
use crate::gateway::MarketGateway;
use crate::strategy::budget::BudgetBook;
use crate::strategy::inventory::bid_ask_ratios_from_base_ratio;
use crate::strategy::spread::{SpreadParams, SpreadSource};
use crate::strategy::volatility::VolatilityEstimator;

/// Per-market quoting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketState {
    /// Gateway not ready or restored orders still being cancelled
    Unready,
    /// Ready with no live orders
    ActiveIdle,
    /// Orders sent, waiting for acks
    Quoting,
    /// Orders resting in the book
    Active,
    /// Cancels sent, waiting for confirmations
    Cancelling,
    /// Order book is empty, trading on hold
    Paused,
}

impl MarketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketState::Unready => "UNREADY",
            MarketState::ActiveIdle => "ACTIVE_IDLE",
            MarketState::Quoting => "QUOTING",
            MarketState::Active => "ACTIVE",
            MarketState::Cancelling => "CANCELLING",
            MarketState::Paused => "PAUSED",
        }
    }

    /// Whether the market takes part in proposal generation.
    pub fn is_quotable(&self) -> bool {
        !matches!(self, MarketState::Unready | MarketState::Paused)
    }

    pub fn can_transition_to(&self, target: MarketState) -> bool {
        use MarketState::*;

        match (self, target) {
            (Unready, ActiveIdle) => true, // gateway ready, no live orders
            (Unready, Paused) => true,     // empty book at startup

            (ActiveIdle, Quoting) => true, // refresh due, proposal valid
            (ActiveIdle, Paused) => true,  // empty order book

            (Quoting, Active) => true,     // order acks received
            (Quoting, ActiveIdle) => true, // placement rejected
            (Quoting, Paused) => true,

            (Active, Cancelling) => true, // age exceeded or out of tolerance
            (Active, ActiveIdle) => true, // orders filled
            (Active, Paused) => true,

            (Cancelling, ActiveIdle) => true, // cancels confirmed
            (Cancelling, Paused) => true,

            (Paused, ActiveIdle) => true, // book recovered

            _ => false,
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strategy parameters with spreads already converted to fractions.
#[derive(Debug, Clone)]
pub struct LiquidityMiningParams {
    pub exchange: String,
    pub markets: Vec<TradingPair>,
    pub token: String,
    pub order_amount: Decimal,
    pub spread: Decimal,
    pub inventory_skew_enabled: bool,
    pub target_base_pct: Decimal,
    pub order_refresh_time: Duration,
    pub order_refresh_tolerance: Decimal,
    pub inventory_range_multiplier: Decimal,
    pub volatility_interval: usize,
    pub avg_volatility_period: usize,
    pub volatility_to_spread_multiplier: Decimal,
    pub max_spread: Decimal,
    pub max_order_age: Duration,
}

impl LiquidityMiningParams {
    /// Build parameters from a validated config section, converting percent
    /// entries (1 = 1%) to fractions.
    pub fn from_config(cfg: &LiquidityMiningConfig) -> Result<Self> {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(CrossmakerError::Validation(errors.join("; ")));
        }
        let markets = cfg
            .market_pairs()
            .map_err(|errors| CrossmakerError::Validation(errors.join("; ")))?;
        Ok(Self {
            exchange: cfg.exchange.clone(),
            markets,
            token: cfg.token.trim().to_ascii_uppercase(),
            order_amount: cfg.order_amount,
            spread: cfg.spread / Decimal::ONE_HUNDRED,
            inventory_skew_enabled: cfg.inventory_skew_enabled,
            target_base_pct: cfg.target_base_pct / Decimal::ONE_HUNDRED,
            order_refresh_time: secs_to_duration(cfg.order_refresh_time),
            order_refresh_tolerance: cfg.order_refresh_tolerance_pct / Decimal::ONE_HUNDRED,
            inventory_range_multiplier: cfg.inventory_range_multiplier,
            volatility_interval: cfg.volatility_interval as usize,
            avg_volatility_period: cfg.avg_volatility_period as usize,
            volatility_to_spread_multiplier: cfg.volatility_to_spread_multiplier,
            max_spread: if cfg.max_spread > Decimal::ZERO {
                cfg.max_spread / Decimal::ONE_HUNDRED
            } else {
                cfg.max_spread
            },
            max_order_age: secs_to_duration(cfg.max_order_age),
        })
    }

    pub fn spread_params(&self) -> SpreadParams {
        SpreadParams {
            spread: self.spread,
            volatility_to_spread_multiplier: self.volatility_to_spread_multiplier,
            max_spread: self.max_spread,
        }
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0) as i64)
}

/// The per-tick market-making core.
pub struct LiquidityMiningStrategy {
    gateway: Arc<dyn MarketGateway>,
    params: LiquidityMiningParams,
    spread_source: SpreadSource,
    states: HashMap<TradingPair, MarketState>,
    volatility: VolatilityEstimator,
    budgets: BudgetBook,
    refresh_times: HashMap<TradingPair, DateTime<Utc>>,
    token_balances: HashMap<String, Decimal>,
    ready_to_trade: bool,
    last_vol_reported: Option<DateTime<Utc>>,
    last_feed_warnings: HashMap<TradingPair, DateTime<Utc>>,
}

impl LiquidityMiningStrategy {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        params: LiquidityMiningParams,
        spread_source: SpreadSource,
    ) -> Self {
        let states = params
            .markets
            .iter()
            .map(|m| (m.clone(), MarketState::Unready))
            .collect();
        let volatility =
            VolatilityEstimator::new(params.volatility_interval, params.avg_volatility_period);
        let budgets = BudgetBook::new(&params.token);
        Self {
            gateway,
            params,
            spread_source,
            states,
            volatility,
            budgets,
            refresh_times: HashMap::new(),
            token_balances: HashMap::new(),
            ready_to_trade: false,
            last_vol_reported: None,
            last_feed_warnings: HashMap::new(),
        }
    }

    pub fn params(&self) -> &LiquidityMiningParams {
        &self.params
    }

    pub fn gateway(&self) -> &Arc<dyn MarketGateway> {
        &self.gateway
    }

    pub fn budgets(&self) -> &BudgetBook {
        &self.budgets
    }

    pub fn is_ready(&self) -> bool {
        self.ready_to_trade
    }

    pub fn market_state(&self, market: &TradingPair) -> MarketState {
        self.states
            .get(market)
            .copied()
            .unwrap_or(MarketState::Unready)
    }

    pub fn volatility(&self, market: &TradingPair) -> Option<Decimal> {
        self.volatility.volatility(market)
    }

    /// Markets currently taking part in quoting, in configuration order.
    pub fn active_markets(&self) -> Vec<TradingPair> {
        self.params
            .markets
            .iter()
            .filter(|m| self.market_state(m).is_quotable())
            .cloned()
            .collect()
    }

    /// Cancel any restored orders so the strategy starts from a clean book.
    pub async fn start(&mut self) {
        for order in self.gateway.limit_orders() {
            if let Err(e) = self
                .gateway
                .cancel(&order.trading_pair, &order.client_order_id)
                .await
            {
                warn!(order = %order.client_order_id, error = %e, "failed to cancel restored order");
            }
        }
    }

    /// Cancel all live orders on shutdown.
    pub async fn stop(&mut self) {
        for order in self.gateway.limit_orders() {
            if let Err(e) = self
                .gateway
                .cancel(&order.trading_pair, &order.client_order_id)
                .await
            {
                warn!(order = %order.client_order_id, error = %e, "failed to cancel order on stop");
            }
        }
    }

    /// Clock tick entry point, run once per second.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.ready_to_trade {
            if !self.gateway.ready() {
                warn!(exchange = self.gateway.name(), "exchange is not ready, please wait");
                return Ok(());
            }
            if !self.gateway.limit_orders().is_empty() {
                // Restored orders should be gone before quoting starts.
                return Ok(());
            }
            info!(exchange = self.gateway.name(), "exchange is ready, trading started");
            if self.validate_order_books() == 0 {
                warn!(
                    exchange = self.gateway.name(),
                    "no pairs with an order book, consider redefining the strategy"
                );
                return Ok(());
            }
            let active = self.active_markets();
            if let Err(e) = self.budgets.allocate(self.gateway.as_ref(), &active) {
                warn!(error = %e, "budget allocation failed, retrying next tick");
                return Ok(());
            }
            self.ready_to_trade = true;
        } else {
            self.validate_order_books();
        }

        self.update_mid_prices();
        self.update_volatility(now);
        let mut proposals = self.create_base_proposals(now).await;
        self.token_balances =
            BudgetBook::adjusted_available_balances(self.gateway.as_ref(), &self.params.markets);
        if self.params.inventory_skew_enabled {
            self.apply_inventory_skew(&mut proposals);
        }
        self.apply_budget_constraint(&mut proposals);
        self.cancel_active_orders(&proposals, now).await;
        self.execute_orders_proposal(&proposals, now).await;
        Ok(())
    }

    /// Verify that markets have a full top of book, pausing the ones that
    /// don't and reactivating the ones that recovered. A one-sided book has
    /// no mid price, so it pauses the market rather than reaching the
    /// allocator. Returns the number of quotable markets.
    fn validate_order_books(&mut self) -> usize {
        let markets = self.params.markets.clone();
        for market in &markets {
            let healthy = self.gateway.get_mid_price(market).is_some();
            match (self.market_state(market), healthy) {
                (MarketState::Unready, true) => self.set_state(market, MarketState::ActiveIdle),
                (MarketState::Unready, false) => {
                    warn!(market = %market, "market has an empty order book, trading is paused");
                    self.set_state(market, MarketState::Paused);
                }
                (MarketState::Paused, true) => {
                    warn!(market = %market, "market is being reactivated");
                    self.set_state(market, MarketState::ActiveIdle);
                }
                (state, false) if state.is_quotable() => {
                    warn!(market = %market, "market has an empty order book, trading is paused");
                    self.set_state(market, MarketState::Paused);
                }
                _ => {}
            }
        }
        self.active_markets().len()
    }

    fn set_state(&mut self, market: &TradingPair, to: MarketState) {
        let from = self.market_state(market);
        if from == to {
            return;
        }
        if !from.can_transition_to(to) {
            debug!(market = %market, from = %from, to = %to, "unexpected market state transition");
        } else {
            debug!(market = %market, from = %from, to = %to, "market state");
        }
        self.states.insert(market.clone(), to);
    }

    fn update_mid_prices(&mut self) {
        for market in self.active_markets() {
            match self.gateway.get_mid_price(&market) {
                Some(mid) => self.volatility.record(&market, mid),
                None => {
                    warn!(market = %market, "no valid mid price after readiness, pausing market");
                    self.set_state(&market, MarketState::Paused);
                }
            }
        }
    }

    fn update_volatility(&mut self, now: DateTime<Utc>) {
        self.volatility.update();
        let report_due = self.last_vol_reported.map_or(true, |last| {
            now - last >= Duration::seconds(self.params.volatility_interval as i64)
        });
        if report_due {
            for market in self.active_markets() {
                if let Some(vol) = self.volatility.volatility(&market) {
                    info!(market = %market, volatility = %format_pct(vol), "market volatility");
                }
            }
            self.last_vol_reported = Some(now);
        }
    }

    async fn create_base_proposals(&mut self, now: DateTime<Utc>) -> Vec<Proposal> {
        let mut proposals = Vec::new();
        for market in self.active_markets() {
            let Some(mid) = self.gateway.get_mid_price(&market) else {
                self.set_state(&market, MarketState::Paused);
                continue;
            };
            let volatility = self.volatility.volatility(&market);
            let quote = self.spread_source.spreads(&market, volatility).await;
            if quote.fallback {
                self.warn_feed_fallback(&market, now);
            }
            let buy_price = self
                .gateway
                .quantize_order_price(&market, mid * (Decimal::ONE - quote.bid_spread));
            let buy_size = self.base_order_size(&market, buy_price);
            let sell_price = self
                .gateway
                .quantize_order_price(&market, mid * (Decimal::ONE + quote.ask_spread));
            let sell_size = self.base_order_size(&market, sell_price);
            proposals.push(Proposal::new(
                market,
                PriceSize::new(buy_price, buy_size),
                PriceSize::new(sell_price, sell_size),
            ));
        }
        proposals
    }

    /// Order size in base units for an order worth `order_amount` of the
    /// campaign token.
    fn base_order_size(&self, market: &TradingPair, price: Decimal) -> Decimal {
        if self.params.token == market.base() {
            return self.params.order_amount;
        }
        let price = if price > Decimal::ZERO {
            price
        } else {
            self.gateway.get_mid_price(market).unwrap_or(Decimal::ZERO)
        };
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.params.order_amount / price
    }

    fn warn_feed_fallback(&mut self, market: &TradingPair, now: DateTime<Utc>) {
        let due = self
            .last_feed_warnings
            .get(market)
            .map_or(true, |last| now - *last >= self.params.order_refresh_time);
        if due {
            warn!(
                market = %market,
                "failed to get dynamic spread data, falling back to static spread"
            );
            self.last_feed_warnings.insert(market.clone(), now);
        }
    }

    /// Apply the inventory split between the base and quote asset.
    fn apply_inventory_skew(&mut self, proposals: &mut [Proposal]) {
        for proposal in proposals {
            let Some(mid) = self.gateway.get_mid_price(&proposal.market) else {
                continue;
            };
            let buy_budget = self.budgets.buy_budget(&proposal.market);
            let sell_budget = self.budgets.sell_budget(&proposal.market);
            let total_order_size = proposal.sell.size + proposal.buy.size;
            let range = total_order_size * self.params.inventory_range_multiplier;
            let ratios = bid_ask_ratios_from_base_ratio(
                sell_budget.to_f64().unwrap_or(0.0),
                buy_budget.to_f64().unwrap_or(0.0),
                mid.to_f64().unwrap_or(0.0),
                self.params.target_base_pct.to_f64().unwrap_or(0.0),
                range.to_f64().unwrap_or(0.0),
            );
            proposal.buy.size *= ratios.bid_ratio;
            proposal.sell.size *= ratios.ask_ratio;
        }
    }

    /// Clamp proposal sizes to what the working balances can actually fund,
    /// fees included on the buy leg. Legs clamped to zero are skipped at
    /// dispatch.
    fn apply_budget_constraint(&mut self, proposals: &mut [Proposal]) {
        let mut balances = self.token_balances.clone();
        for proposal in proposals {
            let base = proposal.base().to_string();
            let quote = proposal.quote().to_string();

            let base_balance = balances.entry(base).or_default();
            if *base_balance < proposal.sell.size {
                proposal.sell.size = *base_balance;
            }
            proposal.sell.size = self
                .gateway
                .quantize_order_amount(&proposal.market, proposal.sell.size);
            *base_balance -= proposal.sell.size;

            let fee = self.gateway.get_fee(
                proposal.base(),
                proposal.quote(),
                OrderType::Limit,
                TradeType::Buy,
                proposal.buy.size,
                proposal.buy.price,
                true,
            );
            let quote_balance = balances.entry(quote).or_default();
            let mut quote_size = proposal.buy.size * proposal.buy.price;
            if *quote_balance < quote_size {
                quote_size = *quote_balance;
            }
            let buy_size = if proposal.buy.price > Decimal::ZERO {
                quote_size / (proposal.buy.price * (Decimal::ONE + fee.percent))
            } else {
                Decimal::ZERO
            };
            proposal.buy.size = self
                .gateway
                .quantize_order_amount(&proposal.market, buy_size);
            *quote_balance -= quote_size;
        }
    }

    /// Within-tolerance check for an existing order pair against the fresh
    /// proposal. The tolerance is a strict maximum.
    fn is_within_tolerance(&self, cur_orders: &[LimitOrder], proposal: &Proposal) -> bool {
        let cur_buy: Vec<&LimitOrder> = cur_orders.iter().filter(|o| o.is_buy).collect();
        let cur_sell: Vec<&LimitOrder> = cur_orders.iter().filter(|o| !o.is_buy).collect();
        if (!cur_buy.is_empty() && proposal.buy.size <= Decimal::ZERO)
            || (!cur_sell.is_empty() && proposal.sell.size <= Decimal::ZERO)
        {
            return false;
        }
        if let Some(order) = cur_buy.first() {
            if order.price > Decimal::ZERO
                && (proposal.buy.price - order.price).abs() / order.price
                    > self.params.order_refresh_tolerance
            {
                return false;
            }
        }
        if let Some(order) = cur_sell.first() {
            if order.price > Decimal::ZERO
                && (proposal.sell.price - order.price).abs() / order.price
                    > self.params.order_refresh_tolerance
            {
                return false;
            }
        }
        true
    }

    fn refresh_time(&self, market: &TradingPair) -> DateTime<Utc> {
        self.refresh_times
            .get(market)
            .copied()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Cancel order pairs that aged out or drifted out of tolerance.
    async fn cancel_active_orders(&mut self, proposals: &[Proposal], now: DateTime<Utc>) {
        for proposal in proposals {
            let cur_orders: Vec<LimitOrder> = self
                .gateway
                .limit_orders()
                .into_iter()
                .filter(|o| o.trading_pair == proposal.market)
                .collect();
            if cur_orders.is_empty() {
                continue;
            }
            let aged_out = cur_orders
                .iter()
                .any(|o| o.age(now) > self.params.max_order_age);
            let refresh_due = self.refresh_time(&proposal.market) <= now;
            let out_of_tolerance = !self.is_within_tolerance(&cur_orders, proposal);
            if !(aged_out || (refresh_due && out_of_tolerance)) {
                continue;
            }
            self.set_state(&proposal.market, MarketState::Cancelling);
            let mut all_cancelled = true;
            for order in &cur_orders {
                match self
                    .gateway
                    .cancel(&proposal.market, &order.client_order_id)
                    .await
                {
                    Ok(()) => {
                        // Force replacement on the next tick.
                        self.refresh_times.insert(
                            proposal.market.clone(),
                            now + Duration::milliseconds(100),
                        );
                    }
                    Err(e) => {
                        warn!(
                            market = %proposal.market,
                            order = %order.client_order_id,
                            error = %e,
                            "cancel rejected, will retry next tick"
                        );
                        all_cancelled = false;
                    }
                }
            }
            if all_cancelled {
                self.set_state(&proposal.market, MarketState::ActiveIdle);
            }
        }
    }

    /// Place the buy/sell legs of proposals whose refresh is due on markets
    /// with no live orders.
    async fn execute_orders_proposal(&mut self, proposals: &[Proposal], now: DateTime<Utc>) {
        let maker_order_type = self.gateway.maker_order_type();
        for proposal in proposals {
            let has_orders = self
                .gateway
                .limit_orders()
                .iter()
                .any(|o| o.trading_pair == proposal.market);
            if has_orders || self.refresh_time(&proposal.market) > now {
                continue;
            }
            let Some(mid) = self.gateway.get_mid_price(&proposal.market) else {
                continue;
            };
            if mid <= Decimal::ZERO {
                continue;
            }

            let mut spread = Decimal::ZERO;
            let mut placed = false;
            let mut attempted = false;
            if proposal.buy.size > Decimal::ZERO {
                attempted = true;
                spread = (proposal.buy.price - mid).abs() / mid;
                self.set_state(&proposal.market, MarketState::Quoting);
                info!(
                    market = %proposal.market,
                    order = %proposal.buy,
                    value = %(proposal.buy.size * proposal.buy.price),
                    quote = proposal.quote(),
                    spread = %format_pct(spread),
                    "creating a bid order"
                );
                match self
                    .gateway
                    .place(
                        &proposal.market,
                        TradeType::Buy,
                        proposal.buy.size,
                        proposal.buy.price,
                        maker_order_type,
                    )
                    .await
                {
                    Ok(_) => placed = true,
                    Err(e) => {
                        warn!(market = %proposal.market, error = %e, "bid rejected, will retry next tick");
                    }
                }
            }
            if proposal.sell.size > Decimal::ZERO {
                attempted = true;
                spread = (proposal.sell.price - mid).abs() / mid;
                self.set_state(&proposal.market, MarketState::Quoting);
                info!(
                    market = %proposal.market,
                    order = %proposal.sell,
                    value = %(proposal.sell.size * proposal.sell.price),
                    quote = proposal.quote(),
                    spread = %format_pct(spread),
                    "creating an ask order"
                );
                match self
                    .gateway
                    .place(
                        &proposal.market,
                        TradeType::Sell,
                        proposal.sell.size,
                        proposal.sell.price,
                        maker_order_type,
                    )
                    .await
                {
                    Ok(_) => placed = true,
                    Err(e) => {
                        warn!(market = %proposal.market, error = %e, "ask rejected, will retry next tick");
                    }
                }
            }

            if placed {
                if let Some(vol) = self.volatility.volatility(&proposal.market) {
                    let adjusted_vol = vol * self.params.volatility_to_spread_multiplier;
                    if spread > self.params.spread && adjusted_vol > self.params.spread {
                        info!(
                            market = %proposal.market,
                            spread = %format_pct(spread),
                            "spread is widened due to high market volatility"
                        );
                    }
                }
                self.refresh_times
                    .insert(proposal.market.clone(), now + self.params.order_refresh_time);
                self.set_state(&proposal.market, MarketState::Active);
            } else if attempted {
                self.set_state(&proposal.market, MarketState::ActiveIdle);
            }
        }
    }

    /// Update budgets on a confirmed own-trade so the allocator's state
    /// stays in sync between reallocations.
    pub fn on_fill(&mut self, event: &OrderFilledEvent) {
        if !self.params.markets.contains(&event.trading_pair) {
            return;
        }
        match event.trade_type {
            TradeType::Buy => info!(
                market = %event.trading_pair,
                price = %event.price,
                amount = %event.amount,
                base = event.trading_pair.base(),
                "maker BUY order filled"
            ),
            TradeType::Sell => info!(
                market = %event.trading_pair,
                price = %event.price,
                amount = %event.amount,
                base = event.trading_pair.base(),
                "maker SELL order filled"
            ),
        }
        self.budgets.apply_fill(
            &event.trading_pair,
            event.trade_type,
            event.amount,
            event.price,
        );
    }
}

fn format_pct(fraction: Decimal) -> String {
    format!("{:.2}%", fraction * Decimal::ONE_HUNDRED)
}
