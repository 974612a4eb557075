//! Market gateway capability set
//!
//! The interface the strategy cores consume from a spot or perpetual venue.
//! Book, balance and fee reads are synchronous lookups against the gateway's
//! local caches and must return before the tick completes; only order
//! commands perform venue I/O.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::{
    FundingInfo, LimitOrder, OrderType, PositionMode, TradeFee, TradeType, TradingPair,
};
use crate::error::Result;

#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Venue identifier (e.g. "binance").
    fn name(&self) -> &str;

    /// Whether the gateway's books and balances are warm enough to trade.
    fn ready(&self) -> bool;

    /// All live maker orders placed through this gateway.
    fn limit_orders(&self) -> Vec<LimitOrder>;

    /// Best ask when `is_buy`, best bid otherwise. `None` for an empty book.
    fn get_price(&self, market: &TradingPair, is_buy: bool) -> Option<Decimal>;

    /// Arithmetic mean of best bid and best ask.
    fn get_mid_price(&self, market: &TradingPair) -> Option<Decimal>;

    fn get_all_balances(&self) -> HashMap<String, Decimal>;

    fn get_available_balance(&self, token: &str) -> Decimal;

    /// Fee estimate for a hypothetical order.
    #[allow(clippy::too_many_arguments)]
    fn get_fee(
        &self,
        base: &str,
        quote: &str,
        order_type: OrderType,
        trade_type: TradeType,
        amount: Decimal,
        price: Decimal,
        is_maker: bool,
    ) -> TradeFee;

    /// Round a price down to the venue's price increment.
    fn quantize_order_price(&self, market: &TradingPair, price: Decimal) -> Decimal;

    /// Round an amount down to the venue's size increment.
    fn quantize_order_amount(&self, market: &TradingPair, amount: Decimal) -> Decimal;

    /// The order type this venue uses for resting maker orders.
    fn maker_order_type(&self) -> OrderType;

    /// Place an order and return its client order id.
    async fn place(
        &self,
        market: &TradingPair,
        side: TradeType,
        size: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<String>;

    async fn cancel(&self, market: &TradingPair, client_order_id: &str) -> Result<()>;
}

/// Extra capabilities of perpetual-futures venues.
#[async_trait]
pub trait PerpetualGateway: MarketGateway {
    async fn set_position_mode(&self, mode: PositionMode) -> Result<()>;

    async fn set_leverage(&self, market: &TradingPair, leverage: u32) -> Result<()>;

    /// Funding state for one market, `None` until the venue has reported it.
    fn get_funding_info(&self, market: &TradingPair) -> Option<FundingInfo>;
}
