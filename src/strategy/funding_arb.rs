//! Funding-rate arbitrage
//!
//! Cross-venue delta-neutral engine that opens paired long/short perpetual
//! positions when the normalized funding-rate differential between two
//! venues exceeds a profitability threshold, then closes them on take-profit
//! or when the funding gap flips against the position. Positions themselves
//! are run by external executors; this core only emits create/stop actions
//! and reads executor PnL back through the registry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::FundingRateArbConfig;
use crate::domain::{FundingInfo, FundingPayment, PositionMode, TradeType, TradingPair};
use crate::error::{CrossmakerError, Result};
use crate::gateway::PerpetualGateway;
use crate::strategy::executor::{
    ExecutorAction, ExecutorHost, ExecutorRegistry, PositionExecutorConfig,
};

/// Funding-rate differentials are normalized to a per-day basis.
pub const FUNDING_PROFITABILITY_INTERVAL_SECS: u64 = 60 * 60 * 24;

fn profitability_interval() -> Decimal {
    Decimal::from(FUNDING_PROFITABILITY_INTERVAL_SECS)
}

/// Per-token arbitrage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArbState {
    /// No position, scanning venue pairs
    Idle,
    /// Create actions emitted, waiting for the host to confirm both
    Entering,
    /// Both executors running
    Open,
    /// Stop actions emitted, waiting for both executors to stop
    Closing,
}

impl ArbState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArbState::Idle => "IDLE",
            ArbState::Entering => "ENTERING",
            ArbState::Open => "OPEN",
            ArbState::Closing => "CLOSING",
        }
    }

    pub fn can_transition_to(&self, target: ArbState) -> bool {
        use ArbState::*;

        matches!(
            (self, target),
            (Idle, Entering)      // diff above threshold
                | (Entering, Open)    // both executors created
                | (Entering, Idle)    // entry rolled back
                | (Open, Closing)     // take-profit or stop-loss hit
                | (Closing, Idle)     // both executors stopped
        )
    }
}

impl fmt::Display for ArbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An open (or closing) funding arbitrage for one token.
#[derive(Debug, Clone)]
pub struct FundingArbitrage {
    pub token: String,
    pub venue_1: String,
    pub venue_2: String,
    pub executor_ids: [String; 2],
    /// BUY = long on venue_1 / short on venue_2, SELL = the reverse.
    pub side: TradeType,
    pub funding_payments: Vec<FundingPayment>,
    pub state: ArbState,
}

impl FundingArbitrage {
    pub fn long_venue(&self) -> &str {
        match self.side {
            TradeType::Buy => &self.venue_1,
            TradeType::Sell => &self.venue_2,
        }
    }

    pub fn short_venue(&self) -> &str {
        match self.side {
            TradeType::Buy => &self.venue_2,
            TradeType::Sell => &self.venue_1,
        }
    }

    pub fn funding_payments_total(&self) -> Decimal {
        self.funding_payments.iter().map(|p| p.amount).sum()
    }
}

/// The winning venue pair for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestCombination {
    pub venue_1: String,
    pub venue_2: String,
    pub side: TradeType,
    /// Normalized rate differential on a per-day basis.
    pub rate_diff: Decimal,
}

#[derive(Debug, Clone)]
pub struct FundingArbParams {
    pub venues: Vec<String>,
    pub tokens: Vec<String>,
    pub leverage: u32,
    pub min_funding_rate_profitability: Decimal,
    pub position_size_quote: Decimal,
    pub profitability_to_take_profit: Decimal,
    pub funding_rate_diff_stop_loss: Decimal,
    pub trade_profitability_condition_to_enter: bool,
}

impl FundingArbParams {
    pub fn from_config(cfg: &FundingRateArbConfig) -> Result<Self> {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(CrossmakerError::Validation(errors.join("; ")));
        }
        Ok(Self {
            venues: cfg.connector_list(),
            tokens: cfg.token_list(),
            leverage: cfg.leverage,
            min_funding_rate_profitability: cfg.min_funding_rate_profitability,
            position_size_quote: cfg.position_size_quote,
            profitability_to_take_profit: cfg.profitability_to_take_profit,
            funding_rate_diff_stop_loss: cfg.funding_rate_diff_stop_loss,
            trade_profitability_condition_to_enter: cfg.trade_profitability_condition_to_enter,
        })
    }
}

pub struct FundingRateArbitrageStrategy {
    gateways: HashMap<String, Arc<dyn PerpetualGateway>>,
    registry: Arc<dyn ExecutorRegistry>,
    params: FundingArbParams,
    quote_markets: HashMap<String, String>,
    active: HashMap<String, FundingArbitrage>,
    stopped: HashMap<String, Vec<FundingArbitrage>>,
}

impl FundingRateArbitrageStrategy {
    pub fn new(
        gateways: HashMap<String, Arc<dyn PerpetualGateway>>,
        registry: Arc<dyn ExecutorRegistry>,
        params: FundingArbParams,
    ) -> Result<Self> {
        for venue in &params.venues {
            if !gateways.contains_key(venue) {
                return Err(CrossmakerError::Validation(format!(
                    "no gateway configured for venue {venue}"
                )));
            }
        }
        let mut quote_markets = HashMap::new();
        quote_markets.insert("hyperliquid_perpetual".to_string(), "USD".to_string());
        quote_markets.insert("binance_perpetual".to_string(), "USDT".to_string());
        let stopped = params
            .tokens
            .iter()
            .map(|t| (t.clone(), Vec::new()))
            .collect();
        Ok(Self {
            gateways,
            registry,
            params,
            quote_markets,
            active: HashMap::new(),
            stopped,
        })
    }

    /// Override the quote asset used to derive trading pairs on a venue.
    pub fn with_quote_market(mut self, venue: &str, quote: &str) -> Self {
        self.quote_markets
            .insert(venue.to_string(), quote.to_string());
        self
    }

    pub fn params(&self) -> &FundingArbParams {
        &self.params
    }

    pub fn active_arbitrages(&self) -> &HashMap<String, FundingArbitrage> {
        &self.active
    }

    pub fn stopped_arbitrages(&self) -> &HashMap<String, Vec<FundingArbitrage>> {
        &self.stopped
    }

    pub fn trading_pair_for(&self, token: &str, venue: &str) -> Result<TradingPair> {
        let quote = self
            .quote_markets
            .get(venue)
            .map(String::as_str)
            .unwrap_or("USDT");
        TradingPair::new(token, quote)
    }

    /// Apply initial venue settings: position mode and leverage on every
    /// configured pair.
    pub async fn start(&self) -> Result<()> {
        for venue in &self.params.venues {
            let Some(gateway) = self.gateways.get(venue) else {
                continue;
            };
            let mode = if venue.starts_with("hyperliquid") {
                PositionMode::Oneway
            } else {
                PositionMode::Hedge
            };
            gateway.set_position_mode(mode).await?;
            for token in &self.params.tokens {
                let pair = self.trading_pair_for(token, venue)?;
                gateway.set_leverage(&pair, self.params.leverage).await?;
            }
        }
        Ok(())
    }

    /// Funding rates for one token across every configured venue.
    pub fn funding_info_by_token(&self, token: &str) -> HashMap<String, FundingInfo> {
        let mut report = HashMap::new();
        for venue in &self.params.venues {
            let Some(gateway) = self.gateways.get(venue) else {
                continue;
            };
            let Ok(pair) = self.trading_pair_for(token, venue) else {
                continue;
            };
            match gateway.get_funding_info(&pair) {
                Some(info) => {
                    report.insert(venue.clone(), info);
                }
                None => debug!(venue = %venue, token = %token, "no funding info yet"),
            }
        }
        report
    }

    /// The most profitable ordered venue pair by per-day normalized funding
    /// differential. Ties keep the first pair encountered in venue order.
    pub fn best_combination(
        &self,
        report: &HashMap<String, FundingInfo>,
    ) -> Option<BestCombination> {
        let mut best: Option<BestCombination> = None;
        let mut highest = Decimal::ZERO;
        for venue_1 in &self.params.venues {
            let Some(info_1) = report.get(venue_1) else {
                continue;
            };
            for venue_2 in &self.params.venues {
                if venue_1 == venue_2 {
                    continue;
                }
                let Some(info_2) = report.get(venue_2) else {
                    continue;
                };
                let rate_1 = info_1.normalized_rate();
                let rate_2 = info_2.normalized_rate();
                let rate_diff = (rate_1 - rate_2).abs() * profitability_interval();
                if rate_diff > highest {
                    highest = rate_diff;
                    best = Some(BestCombination {
                        venue_1: venue_1.clone(),
                        venue_2: venue_2.clone(),
                        side: if rate_1 < rate_2 {
                            TradeType::Buy
                        } else {
                            TradeType::Sell
                        },
                        rate_diff,
                    });
                }
            }
        }
        best
    }

    /// Expected instantaneous PnL of opening both market legs, minus both
    /// venues' taker fees. BUY means long on `venue_1`, short on `venue_2`.
    pub fn profitability_after_fees(
        &self,
        token: &str,
        venue_1: &str,
        venue_2: &str,
        side: TradeType,
    ) -> Result<Decimal> {
        let pair_1 = self.trading_pair_for(token, venue_1)?;
        let pair_2 = self.trading_pair_for(token, venue_2)?;
        let gateway_1 = self.gateway(venue_1)?;
        let gateway_2 = self.gateway(venue_2)?;

        let price_1 = gateway_1
            .get_price(&pair_1, side == TradeType::Buy)
            .ok_or_else(|| CrossmakerError::NotReady(format!("{venue_1} has no book for {pair_1}")))?;
        let price_2 = gateway_2
            .get_price(&pair_2, side != TradeType::Buy)
            .ok_or_else(|| CrossmakerError::NotReady(format!("{venue_2} has no book for {pair_2}")))?;
        if price_1 <= Decimal::ZERO || price_2 <= Decimal::ZERO {
            return Err(CrossmakerError::InvalidMarketData(format!(
                "non-positive book prices for {token}: {price_1} / {price_2}"
            )));
        }

        // Fees are estimated as taker BUY on both legs.
        let fee_1 = gateway_1
            .get_fee(
                pair_1.base(),
                pair_1.quote(),
                crate::domain::OrderType::Market,
                TradeType::Buy,
                self.params.position_size_quote / price_1,
                price_1,
                false,
            )
            .percent;
        let fee_2 = gateway_2
            .get_fee(
                pair_2.base(),
                pair_2.quote(),
                crate::domain::OrderType::Market,
                TradeType::Buy,
                self.params.position_size_quote / price_2,
                price_2,
                false,
            )
            .percent;

        let trade_pnl_pct = if side == TradeType::Buy {
            (price_2 - price_1) / price_1
        } else {
            (price_1 - price_2) / price_2
        };
        Ok(trade_pnl_pct - fee_1 - fee_2)
    }

    /// One strategy tick: entry scan for tokens without an active arbitrage,
    /// then exit checks on open ones. Create actions for one arbitrage are
    /// returned together so the host can dispatch them atomically.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<ExecutorAction>> {
        let mut actions = self.create_actions(now);
        actions.extend(self.stop_actions());
        Ok(actions)
    }

    fn create_actions(&mut self, now: DateTime<Utc>) -> Vec<ExecutorAction> {
        for token in self.params.tokens.clone() {
            if self.active.contains_key(&token) {
                continue;
            }
            let report = self.funding_info_by_token(&token);
            if report.len() < 2 {
                continue;
            }
            let Some(best) = self.best_combination(&report) else {
                continue;
            };
            if best.rate_diff < self.params.min_funding_rate_profitability {
                continue;
            }
            let profitability = match self.profitability_after_fees(
                &token,
                &best.venue_1,
                &best.venue_2,
                best.side,
            ) {
                Ok(profitability) => profitability,
                Err(e) => {
                    warn!(token = %token, error = %e, "cannot estimate trade profitability");
                    continue;
                }
            };
            if self.params.trade_profitability_condition_to_enter
                && profitability < Decimal::ZERO
            {
                info!(
                    token = %token,
                    venue_1 = %best.venue_1,
                    venue_2 = %best.venue_2,
                    side = %best.side,
                    funding_rate_profitability = %best.rate_diff,
                    trade_profitability = %profitability,
                    "trade profitability is negative, skipping"
                );
                continue;
            }
            let (config_1, config_2) = match self.position_executor_configs(&token, &best, now) {
                Ok(configs) => configs,
                Err(e) => {
                    warn!(token = %token, error = %e, "cannot size position executors");
                    continue;
                }
            };
            info!(
                token = %token,
                venue_1 = %best.venue_1,
                venue_2 = %best.venue_2,
                side = %best.side,
                funding_rate_profitability = %best.rate_diff,
                trade_profitability = %profitability,
                "starting executors"
            );
            self.active.insert(
                token.clone(),
                FundingArbitrage {
                    token: token.clone(),
                    venue_1: best.venue_1.clone(),
                    venue_2: best.venue_2.clone(),
                    executor_ids: [config_1.id.clone(), config_2.id.clone()],
                    side: best.side,
                    funding_payments: Vec::new(),
                    state: ArbState::Entering,
                },
            );
            // One entry per tick; the pair is dispatched atomically.
            return vec![
                ExecutorAction::Create(config_1),
                ExecutorAction::Create(config_2),
            ];
        }
        Vec::new()
    }

    fn position_executor_configs(
        &self,
        token: &str,
        best: &BestCombination,
        now: DateTime<Utc>,
    ) -> Result<(PositionExecutorConfig, PositionExecutorConfig)> {
        let pair_1 = self.trading_pair_for(token, &best.venue_1)?;
        let pair_2 = self.trading_pair_for(token, &best.venue_2)?;
        let price = self
            .gateway(&best.venue_1)?
            .get_mid_price(&pair_1)
            .ok_or_else(|| {
                CrossmakerError::NotReady(format!("{} has no mid for {pair_1}", best.venue_1))
            })?;
        if price <= Decimal::ZERO {
            return Err(CrossmakerError::InvalidMarketData(format!(
                "non-positive mid for {pair_1}: {price}"
            )));
        }
        let amount = self.params.position_size_quote / price;
        let config_1 = PositionExecutorConfig::market_open(
            now,
            &best.venue_1,
            pair_1,
            best.side,
            amount,
            self.params.leverage,
        );
        let config_2 = PositionExecutorConfig::market_open(
            now,
            &best.venue_2,
            pair_2,
            best.side.opposite(),
            amount,
            self.params.leverage,
        );
        Ok((config_1, config_2))
    }

    fn stop_actions(&mut self) -> Vec<ExecutorAction> {
        let mut actions = Vec::new();
        let mut closing: Vec<String> = Vec::new();
        for token in &self.params.tokens {
            let Some(arb) = self.active.get(token) else {
                continue;
            };
            match arb.state {
                ArbState::Closing => {
                    // Host failed to confirm the stop last tick; re-emit.
                    actions.extend(arb.executor_ids.iter().map(|id| ExecutorAction::Stop {
                        executor_id: id.clone(),
                    }));
                    continue;
                }
                ArbState::Open => {}
                _ => continue,
            }

            let executors_pnl: Decimal = self
                .registry
                .executors()
                .into_iter()
                .filter(|e| arb.executor_ids.contains(&e.id))
                .map(|e| e.net_pnl_quote)
                .sum();
            let funding_pnl = arb.funding_payments_total();
            let take_profit = executors_pnl + funding_pnl
                > self.params.profitability_to_take_profit * self.params.position_size_quote;

            let report = self.funding_info_by_token(token);
            // The funding gap measured in the direction that benefits the
            // position: short venue minus long venue.
            let stop_loss = match (report.get(arb.long_venue()), report.get(arb.short_venue())) {
                (Some(long_info), Some(short_info)) => {
                    let gap = (short_info.normalized_rate() - long_info.normalized_rate())
                        * profitability_interval();
                    gap < self.params.funding_rate_diff_stop_loss
                }
                _ => false,
            };

            if take_profit {
                info!(token = %token, "take profit profitability reached, stopping executors");
            } else if stop_loss {
                info!(
                    token = %token,
                    "funding rate difference reached stop loss, stopping executors"
                );
            } else {
                continue;
            }
            actions.extend(arb.executor_ids.iter().map(|id| ExecutorAction::Stop {
                executor_id: id.clone(),
            }));
            closing.push(token.clone());
        }
        for token in closing {
            self.transition(&token, ArbState::Closing);
        }
        actions
    }

    /// Host confirmation that both create actions for a token succeeded.
    pub fn on_executors_created(&mut self, token: &str) {
        self.transition(token, ArbState::Open);
    }

    /// Host report that the paired entry failed and was rolled back.
    pub fn on_entry_failed(&mut self, token: &str) {
        if let Some(arb) = self.active.get(token) {
            if arb.state == ArbState::Entering {
                warn!(token = %token, "paired entry failed, rolling back");
                self.active.remove(token);
            }
        }
    }

    /// Host confirmation that both executors of a token stopped.
    pub fn on_executors_stopped(&mut self, token: &str) {
        if let Some(mut arb) = self.active.remove(token) {
            arb.state = ArbState::Idle;
            self.stopped.entry(token.to_string()).or_default().push(arb);
        }
    }

    /// Route a funding payment to the active arbitrage of its base token.
    pub fn on_funding_payment(&mut self, payment: &FundingPayment) {
        let token = payment.trading_pair.base();
        if let Some(arb) = self.active.get_mut(token) {
            info!(
                token = %token,
                venue = %payment.venue,
                amount = %payment.amount,
                "funding payment received"
            );
            arb.funding_payments.push(payment.clone());
        }
    }

    fn gateway(&self, venue: &str) -> Result<&Arc<dyn PerpetualGateway>> {
        self.gateways.get(venue).ok_or_else(|| {
            CrossmakerError::Validation(format!("no gateway configured for venue {venue}"))
        })
    }

    fn transition(&mut self, token: &str, to: ArbState) {
        if let Some(arb) = self.active.get_mut(token) {
            if arb.state == to {
                return;
            }
            if !arb.state.can_transition_to(to) {
                warn!(token = %token, from = %arb.state, to = %to, "unexpected arbitrage state transition");
            } else {
                debug!(token = %token, from = %arb.state, to = %to, "arbitrage state");
            }
            arb.state = to;
        }
    }
}

/// Funding-arbitrage strategy wired to an executor host. Keeps the pair of
/// create actions atomic: the entry is confirmed only when the host accepts
/// the whole batch, rolled back otherwise.
pub struct HostedFundingArbitrage {
    strategy: FundingRateArbitrageStrategy,
    host: Arc<dyn ExecutorHost>,
}

impl HostedFundingArbitrage {
    pub fn new(strategy: FundingRateArbitrageStrategy, host: Arc<dyn ExecutorHost>) -> Self {
        Self { strategy, host }
    }

    pub fn strategy(&self) -> &FundingRateArbitrageStrategy {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut FundingRateArbitrageStrategy {
        &mut self.strategy
    }

    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let actions = self.strategy.tick(now)?;
        if actions.is_empty() {
            return Ok(());
        }

        let (creates, stops): (Vec<_>, Vec<_>) = actions
            .into_iter()
            .partition(|a| matches!(a, ExecutorAction::Create(_)));

        if !creates.is_empty() {
            let entering: Vec<String> = self
                .strategy
                .active
                .values()
                .filter(|a| a.state == ArbState::Entering)
                .map(|a| a.token.clone())
                .collect();
            match self.host.dispatch(creates).await {
                Ok(()) => {
                    for token in entering {
                        self.strategy.on_executors_created(&token);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "executor creation failed");
                    for token in entering {
                        self.strategy.on_entry_failed(&token);
                    }
                }
            }
        }

        if !stops.is_empty() {
            let closing: Vec<String> = self
                .strategy
                .active
                .values()
                .filter(|a| a.state == ArbState::Closing)
                .map(|a| a.token.clone())
                .collect();
            match self.host.dispatch(stops).await {
                Ok(()) => {
                    for token in closing {
                        self.strategy.on_executors_stopped(&token);
                    }
                }
                Err(e) => {
                    // Arbitrages stay in Closing; stops are re-emitted next tick.
                    warn!(error = %e, "executor stop failed, will retry next tick");
                }
            }
        }
        Ok(())
    }

    /// Stop every running executor on shutdown.
    pub async fn stop(&mut self) -> Result<()> {
        let stops: Vec<ExecutorAction> = self
            .strategy
            .active
            .values()
            .flat_map(|arb| {
                arb.executor_ids.iter().map(|id| ExecutorAction::Stop {
                    executor_id: id.clone(),
                })
            })
            .collect();
        if stops.is_empty() {
            return Ok(());
        }
        let tokens: Vec<String> = self.strategy.active.keys().cloned().collect();
        self.host.dispatch(stops).await?;
        for token in tokens {
            self.strategy.on_executors_stopped(&token);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PaperGateway;
    use crate::strategy::executor::{ExecutorSnapshot, MockExecutorRegistry};
    use rust_decimal_macros::dec;

    fn funding(rate: Decimal, interval: u64) -> FundingInfo {
        FundingInfo {
            rate,
            next_funding_utc: Utc::now(),
            payment_interval_secs: interval,
        }
    }

    fn perp_gateway(name: &str, token: &str, rate: Decimal, interval: u64) -> Arc<PaperGateway> {
        let gw = Arc::new(PaperGateway::new(name));
        let pair = TradingPair::new(token, "USDT").unwrap();
        gw.set_mid(&pair, dec!(2));
        gw.set_funding_info(&pair, funding(rate, interval));
        gw
    }

    fn empty_registry() -> Arc<MockExecutorRegistry> {
        let mut registry = MockExecutorRegistry::new();
        registry.expect_executors().returning(Vec::new);
        Arc::new(registry)
    }

    fn params(venues: &[&str], tokens: &[&str]) -> FundingArbParams {
        FundingArbParams {
            venues: venues.iter().map(|v| v.to_string()).collect(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            leverage: 20,
            min_funding_rate_profitability: dec!(0.001),
            position_size_quote: dec!(100),
            profitability_to_take_profit: dec!(0.01),
            funding_rate_diff_stop_loss: dec!(-0.001),
            trade_profitability_condition_to_enter: false,
        }
    }

    fn strategy_with(
        gateways: Vec<(&str, Arc<PaperGateway>)>,
        registry: Arc<MockExecutorRegistry>,
        params: FundingArbParams,
    ) -> FundingRateArbitrageStrategy {
        let gateways: HashMap<String, Arc<dyn PerpetualGateway>> = gateways
            .into_iter()
            .map(|(name, gw)| (name.to_string(), gw as Arc<dyn PerpetualGateway>))
            .collect();
        FundingRateArbitrageStrategy::new(gateways, registry, params).unwrap()
    }

    #[test]
    fn arb_state_transitions() {
        use ArbState::*;
        assert!(Idle.can_transition_to(Entering));
        assert!(Entering.can_transition_to(Open));
        assert!(Entering.can_transition_to(Idle));
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Open));
        assert!(!Open.can_transition_to(Entering));
        assert!(!Closing.can_transition_to(Open));
    }

    #[test]
    fn best_combination_picks_widest_normalized_gap() {
        // Normalized per-second rates: 1e-6, 3e-6, 2e-6.
        let strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0.000001), 1)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0.000003), 1)),
                ("venue_c", perp_gateway("venue_c", "WIF", dec!(0.000002), 1)),
            ],
            empty_registry(),
            params(&["venue_a", "venue_b", "venue_c"], &["WIF"]),
        );
        let report = strategy.funding_info_by_token("WIF");
        let best = strategy.best_combination(&report).expect("combination");
        assert_eq!(best.venue_1, "venue_a");
        assert_eq!(best.venue_2, "venue_b");
        assert_eq!(best.side, TradeType::Buy);
        assert_eq!(best.rate_diff, dec!(0.000002) * dec!(86400));
    }

    #[test]
    fn entry_gated_below_min_profitability() {
        // Per-day diff 0.009 with min 0.01: no executors created.
        let mut params = params(&["venue_a", "venue_b"], &["WIF"]);
        params.min_funding_rate_profitability = dec!(0.01);
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0), 86400)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0.009), 86400)),
            ],
            empty_registry(),
            params,
        );
        let actions = strategy.tick(Utc::now()).unwrap();
        assert!(actions.is_empty());
        assert!(strategy.active_arbitrages().is_empty());
    }

    #[test]
    fn entry_emits_paired_creates() {
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0), 86400)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0.02), 86400)),
            ],
            empty_registry(),
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        let actions = strategy.tick(Utc::now()).unwrap();
        assert_eq!(actions.len(), 2);
        let configs: Vec<&PositionExecutorConfig> = actions
            .iter()
            .map(|a| match a {
                ExecutorAction::Create(config) => config,
                ExecutorAction::Stop { .. } => panic!("expected create actions"),
            })
            .collect();
        // Long the cheap-funding venue, short the expensive one, same size.
        assert_eq!(configs[0].venue, "venue_a");
        assert_eq!(configs[0].side, TradeType::Buy);
        assert_eq!(configs[1].venue, "venue_b");
        assert_eq!(configs[1].side, TradeType::Sell);
        assert_eq!(configs[0].amount, configs[1].amount);
        assert_eq!(configs[0].amount, dec!(50)); // 100 quote at mid 2
        assert_eq!(
            strategy.active_arbitrages()["WIF"].state,
            ArbState::Entering
        );
    }

    #[test]
    fn take_profit_threshold_is_strict() {
        let registry = {
            let mut registry = MockExecutorRegistry::new();
            registry.expect_executors().returning(|| {
                vec![
                    ExecutorSnapshot {
                        id: "e1".to_string(),
                        net_pnl_quote: dec!(0.51),
                        is_active: true,
                    },
                    ExecutorSnapshot {
                        id: "e2".to_string(),
                        net_pnl_quote: dec!(0.50),
                        is_active: true,
                    },
                ]
            });
            Arc::new(registry)
        };
        // Equal rates so the stop-loss leg stays quiet.
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0.0001), 3600)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0.0001), 3600)),
            ],
            registry,
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        strategy.active.insert(
            "WIF".to_string(),
            FundingArbitrage {
                token: "WIF".to_string(),
                venue_1: "venue_a".to_string(),
                venue_2: "venue_b".to_string(),
                executor_ids: ["e1".to_string(), "e2".to_string()],
                side: TradeType::Buy,
                funding_payments: Vec::new(),
                state: ArbState::Open,
            },
        );

        // Combined PnL 1.01 > 0.01 * 100: stops emitted.
        let actions = strategy.stop_actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(strategy.active["WIF"].state, ArbState::Closing);
    }

    #[test]
    fn take_profit_not_reached_below_threshold() {
        let registry = {
            let mut registry = MockExecutorRegistry::new();
            registry.expect_executors().returning(|| {
                vec![ExecutorSnapshot {
                    id: "e1".to_string(),
                    net_pnl_quote: dec!(0.99),
                    is_active: true,
                }]
            });
            Arc::new(registry)
        };
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0.0001), 3600)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0.0001), 3600)),
            ],
            registry,
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        strategy.active.insert(
            "WIF".to_string(),
            FundingArbitrage {
                token: "WIF".to_string(),
                venue_1: "venue_a".to_string(),
                venue_2: "venue_b".to_string(),
                executor_ids: ["e1".to_string(), "e2".to_string()],
                side: TradeType::Buy,
                funding_payments: Vec::new(),
                state: ArbState::Open,
            },
        );
        assert!(strategy.stop_actions().is_empty());
        assert_eq!(strategy.active["WIF"].state, ArbState::Open);
    }

    #[test]
    fn funding_payments_count_toward_take_profit() {
        let registry = {
            let mut registry = MockExecutorRegistry::new();
            registry.expect_executors().returning(|| {
                vec![ExecutorSnapshot {
                    id: "e1".to_string(),
                    net_pnl_quote: dec!(0.5),
                    is_active: true,
                }]
            });
            Arc::new(registry)
        };
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0.0001), 3600)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0.0001), 3600)),
            ],
            registry,
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        strategy.active.insert(
            "WIF".to_string(),
            FundingArbitrage {
                token: "WIF".to_string(),
                venue_1: "venue_a".to_string(),
                venue_2: "venue_b".to_string(),
                executor_ids: ["e1".to_string(), "e2".to_string()],
                side: TradeType::Buy,
                funding_payments: Vec::new(),
                state: ArbState::Open,
            },
        );
        let payment = FundingPayment {
            venue: "venue_a".to_string(),
            trading_pair: TradingPair::new("WIF", "USDT").unwrap(),
            amount: dec!(0.6),
            timestamp: Utc::now(),
        };
        strategy.on_funding_payment(&payment);
        assert_eq!(
            strategy.active["WIF"].funding_payments_total(),
            dec!(0.6)
        );

        // 0.5 + 0.6 > 1.0: closes on funding income.
        let actions = strategy.stop_actions();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn stop_loss_fires_when_gap_flips() {
        // Side BUY: long venue_a, short venue_b. Gap (short - long) per day
        // drops to -0.002, below the -0.001 stop loss.
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0.002), 86400)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0), 86400)),
            ],
            empty_registry(),
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        strategy.active.insert(
            "WIF".to_string(),
            FundingArbitrage {
                token: "WIF".to_string(),
                venue_1: "venue_a".to_string(),
                venue_2: "venue_b".to_string(),
                executor_ids: ["e1".to_string(), "e2".to_string()],
                side: TradeType::Buy,
                funding_payments: Vec::new(),
                state: ArbState::Open,
            },
        );
        let actions = strategy.stop_actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(strategy.active["WIF"].state, ArbState::Closing);
    }

    #[test]
    fn stopped_history_records_after_host_confirms() {
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0), 3600)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0), 3600)),
            ],
            empty_registry(),
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        strategy.active.insert(
            "WIF".to_string(),
            FundingArbitrage {
                token: "WIF".to_string(),
                venue_1: "venue_a".to_string(),
                venue_2: "venue_b".to_string(),
                executor_ids: ["e1".to_string(), "e2".to_string()],
                side: TradeType::Sell,
                funding_payments: Vec::new(),
                state: ArbState::Closing,
            },
        );
        strategy.on_executors_stopped("WIF");
        assert!(strategy.active_arbitrages().is_empty());
        assert_eq!(strategy.stopped_arbitrages()["WIF"].len(), 1);
    }

    #[test]
    fn funding_payment_for_unknown_token_is_ignored() {
        let mut strategy = strategy_with(
            vec![
                ("venue_a", perp_gateway("venue_a", "WIF", dec!(0), 3600)),
                ("venue_b", perp_gateway("venue_b", "WIF", dec!(0), 3600)),
            ],
            empty_registry(),
            params(&["venue_a", "venue_b"], &["WIF"]),
        );
        let payment = FundingPayment {
            venue: "venue_a".to_string(),
            trading_pair: TradingPair::new("FET", "USDT").unwrap(),
            amount: dec!(1),
            timestamp: Utc::now(),
        };
        strategy.on_funding_payment(&payment);
        assert!(strategy.active_arbitrages().is_empty());
    }
}
