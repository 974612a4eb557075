//! In-process paper venue
//!
//! A deterministic in-memory implementation of the gateway traits, used by
//! the dry-run binary and the scenario tests. Books, balances, funding and
//! the clock are all settable; order placement locks funds the way a real
//! venue does and fills can be injected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    FundingInfo, LimitOrder, OrderFilledEvent, OrderType, PositionMode, TradeFee, TradeType,
    TradingPair,
};
use crate::error::{CrossmakerError, Result};

use super::traits::{MarketGateway, PerpetualGateway};

#[derive(Debug, Default)]
struct PaperBook {
    best_bid: Option<Decimal>,
    best_ask: Option<Decimal>,
}

#[derive(Debug)]
struct PaperState {
    ready: bool,
    now: Option<DateTime<Utc>>,
    books: HashMap<TradingPair, PaperBook>,
    balances: HashMap<String, Decimal>,
    orders: Vec<LimitOrder>,
    funding: HashMap<TradingPair, FundingInfo>,
    leverage: HashMap<TradingPair, u32>,
    position_mode: Option<PositionMode>,
    fail_orders: bool,
}

/// Simulated spot/perpetual venue.
pub struct PaperGateway {
    name: String,
    fee_pct: Decimal,
    price_step: Decimal,
    amount_step: Decimal,
    maker_order_type: OrderType,
    state: RwLock<PaperState>,
}

impl PaperGateway {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fee_pct: Decimal::ZERO,
            price_step: Decimal::ZERO,
            amount_step: Decimal::ZERO,
            maker_order_type: OrderType::LimitMaker,
            state: RwLock::new(PaperState {
                ready: true,
                now: None,
                books: HashMap::new(),
                balances: HashMap::new(),
                orders: Vec::new(),
                funding: HashMap::new(),
                leverage: HashMap::new(),
                position_mode: None,
                fail_orders: false,
            }),
        }
    }

    pub fn with_fee(mut self, fee_pct: Decimal) -> Self {
        self.fee_pct = fee_pct;
        self
    }

    /// Set quantization increments. Zero disables rounding on that axis.
    pub fn with_steps(mut self, price_step: Decimal, amount_step: Decimal) -> Self {
        self.price_step = price_step;
        self.amount_step = amount_step;
        self
    }

    pub fn with_maker_order_type(mut self, order_type: OrderType) -> Self {
        self.maker_order_type = order_type;
        self
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PaperState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PaperState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_ready(&self, ready: bool) {
        self.write().ready = ready;
    }

    /// Pin the gateway clock for deterministic order ages.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.write().now = Some(now);
    }

    pub fn set_book(&self, market: &TradingPair, best_bid: Option<Decimal>, best_ask: Option<Decimal>) {
        self.write()
            .books
            .insert(market.clone(), PaperBook { best_bid, best_ask });
    }

    /// Set a degenerate book with bid == ask == mid.
    pub fn set_mid(&self, market: &TradingPair, mid: Decimal) {
        self.set_book(market, Some(mid), Some(mid));
    }

    pub fn set_balance(&self, token: &str, amount: Decimal) {
        self.write().balances.insert(token.to_string(), amount);
    }

    pub fn set_funding_info(&self, market: &TradingPair, info: FundingInfo) {
        self.write().funding.insert(market.clone(), info);
    }

    /// Make subsequent place/cancel calls fail with a gateway rejection.
    pub fn set_fail_orders(&self, fail: bool) {
        self.write().fail_orders = fail;
    }

    pub fn position_mode(&self) -> Option<PositionMode> {
        self.read().position_mode
    }

    pub fn leverage(&self, market: &TradingPair) -> Option<u32> {
        self.read().leverage.get(market).copied()
    }

    fn locked_in_orders(state: &PaperState) -> HashMap<String, Decimal> {
        let mut locked: HashMap<String, Decimal> = HashMap::new();
        for order in &state.orders {
            if order.is_buy {
                *locked
                    .entry(order.trading_pair.quote().to_string())
                    .or_default() += order.quantity * order.price;
            } else {
                *locked
                    .entry(order.trading_pair.base().to_string())
                    .or_default() += order.quantity;
            }
        }
        locked
    }

    /// Fill a live order in full, moving balances, and return the fill event.
    pub fn fill(&self, client_order_id: &str) -> Option<OrderFilledEvent> {
        let mut state = self.write();
        let idx = state
            .orders
            .iter()
            .position(|o| o.client_order_id == client_order_id)?;
        let order = state.orders.remove(idx);
        let quote_value = order.quantity * order.price;
        let (base, quote) = (
            order.trading_pair.base().to_string(),
            order.trading_pair.quote().to_string(),
        );
        if order.is_buy {
            *state.balances.entry(base).or_default() += order.quantity;
            *state.balances.entry(quote).or_default() -= quote_value;
        } else {
            *state.balances.entry(base).or_default() -= order.quantity;
            *state.balances.entry(quote).or_default() += quote_value;
        }
        let timestamp = state.now.unwrap_or_else(Utc::now);
        Some(OrderFilledEvent {
            trading_pair: order.trading_pair,
            client_order_id: order.client_order_id,
            trade_type: if order.is_buy {
                TradeType::Buy
            } else {
                TradeType::Sell
            },
            price: order.price,
            amount: order.quantity,
            timestamp,
        })
    }

    fn quantize(value: Decimal, step: Decimal) -> Decimal {
        if step <= Decimal::ZERO {
            return value;
        }
        (value / step).floor() * step
    }
}

#[async_trait]
impl MarketGateway for PaperGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn ready(&self) -> bool {
        self.read().ready
    }

    fn limit_orders(&self) -> Vec<LimitOrder> {
        self.read().orders.clone()
    }

    fn get_price(&self, market: &TradingPair, is_buy: bool) -> Option<Decimal> {
        let state = self.read();
        let book = state.books.get(market)?;
        if is_buy {
            book.best_ask
        } else {
            book.best_bid
        }
    }

    fn get_mid_price(&self, market: &TradingPair) -> Option<Decimal> {
        let state = self.read();
        let book = state.books.get(market)?;
        match (book.best_bid, book.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    fn get_all_balances(&self) -> HashMap<String, Decimal> {
        self.read().balances.clone()
    }

    fn get_available_balance(&self, token: &str) -> Decimal {
        let state = self.read();
        let total = state.balances.get(token).copied().unwrap_or(Decimal::ZERO);
        let locked = Self::locked_in_orders(&state)
            .get(token)
            .copied()
            .unwrap_or(Decimal::ZERO);
        (total - locked).max(Decimal::ZERO)
    }

    fn get_fee(
        &self,
        _base: &str,
        _quote: &str,
        _order_type: OrderType,
        _trade_type: TradeType,
        _amount: Decimal,
        _price: Decimal,
        _is_maker: bool,
    ) -> TradeFee {
        TradeFee::new(self.fee_pct)
    }

    fn quantize_order_price(&self, _market: &TradingPair, price: Decimal) -> Decimal {
        Self::quantize(price, self.price_step)
    }

    fn quantize_order_amount(&self, _market: &TradingPair, amount: Decimal) -> Decimal {
        Self::quantize(amount, self.amount_step)
    }

    fn maker_order_type(&self) -> OrderType {
        self.maker_order_type
    }

    async fn place(
        &self,
        market: &TradingPair,
        side: TradeType,
        size: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<String> {
        if !order_type.is_limit_type() {
            return Err(CrossmakerError::GatewayRejection {
                action: "place".to_string(),
                market: market.to_string(),
                reason: "paper venue only rests limit orders".to_string(),
            });
        }
        let mut state = self.write();
        if state.fail_orders {
            return Err(CrossmakerError::GatewayRejection {
                action: "place".to_string(),
                market: market.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let client_order_id = Uuid::new_v4().to_string();
        let created_at = state.now.unwrap_or_else(Utc::now);
        state.orders.push(LimitOrder {
            trading_pair: market.clone(),
            client_order_id: client_order_id.clone(),
            price,
            quantity: size,
            is_buy: side == TradeType::Buy,
            created_at,
        });
        Ok(client_order_id)
    }

    async fn cancel(&self, market: &TradingPair, client_order_id: &str) -> Result<()> {
        let mut state = self.write();
        if state.fail_orders {
            return Err(CrossmakerError::GatewayRejection {
                action: "cancel".to_string(),
                market: market.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let before = state.orders.len();
        state.orders.retain(|o| o.client_order_id != client_order_id);
        if state.orders.len() == before {
            return Err(CrossmakerError::GatewayRejection {
                action: "cancel".to_string(),
                market: market.to_string(),
                reason: format!("unknown order {client_order_id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PerpetualGateway for PaperGateway {
    async fn set_position_mode(&self, mode: PositionMode) -> Result<()> {
        self.write().position_mode = Some(mode);
        Ok(())
    }

    async fn set_leverage(&self, market: &TradingPair, leverage: u32) -> Result<()> {
        self.write().leverage.insert(market.clone(), leverage);
        Ok(())
    }

    fn get_funding_info(&self, market: &TradingPair) -> Option<FundingInfo> {
        self.read().funding.get(market).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(raw: &str) -> TradingPair {
        raw.parse().expect("valid pair")
    }

    #[test]
    fn mid_price_requires_both_sides() {
        let gw = PaperGateway::new("paper");
        let market = pair("ETH-USDT");
        gw.set_book(&market, Some(dec!(1990)), Some(dec!(2010)));
        assert_eq!(gw.get_mid_price(&market), Some(dec!(2000)));

        gw.set_book(&market, Some(dec!(1990)), None);
        assert_eq!(gw.get_mid_price(&market), None);
    }

    #[test]
    fn quantize_floors_to_step() {
        let gw = PaperGateway::new("paper").with_steps(dec!(0.01), dec!(0.001));
        let market = pair("ETH-USDT");
        assert_eq!(gw.quantize_order_price(&market, dec!(1999.996)), dec!(1999.99));
        assert_eq!(gw.quantize_order_amount(&market, dec!(0.12345)), dec!(0.123));
    }

    #[test]
    fn placing_buy_locks_quote_balance() {
        let gw = PaperGateway::new("paper");
        let market = pair("ETH-USDT");
        gw.set_balance("USDT", dec!(1000));

        let id = tokio_test::block_on(gw.place(
            &market,
            TradeType::Buy,
            dec!(0.1),
            dec!(2000),
            OrderType::LimitMaker,
        ))
        .expect("order should place");

        assert_eq!(gw.get_available_balance("USDT"), dec!(800));
        assert_eq!(gw.get_all_balances()["USDT"], dec!(1000));

        tokio_test::block_on(gw.cancel(&market, &id)).expect("order should cancel");
        assert_eq!(gw.get_available_balance("USDT"), dec!(1000));
    }

    #[test]
    fn fill_moves_balances() {
        let gw = PaperGateway::new("paper");
        let market = pair("ETH-USDT");
        gw.set_balance("USDT", dec!(1000));
        gw.set_balance("ETH", dec!(0));

        let id = tokio_test::block_on(gw.place(
            &market,
            TradeType::Buy,
            dec!(0.1),
            dec!(2000),
            OrderType::LimitMaker,
        ))
        .unwrap();

        let fill = gw.fill(&id).expect("order should fill");
        assert_eq!(fill.trade_type, TradeType::Buy);
        assert_eq!(gw.get_all_balances()["ETH"], dec!(0.1));
        assert_eq!(gw.get_all_balances()["USDT"], dec!(800));
        assert!(gw.limit_orders().is_empty());
    }

    #[test]
    fn injected_failure_rejects_orders() {
        let gw = PaperGateway::new("paper");
        let market = pair("ETH-USDT");
        gw.set_fail_orders(true);
        let err = tokio_test::block_on(gw.place(
            &market,
            TradeType::Sell,
            dec!(1),
            dec!(2000),
            OrderType::Limit,
        ))
        .unwrap_err();
        assert!(matches!(err, CrossmakerError::GatewayRejection { .. }));
    }
}
