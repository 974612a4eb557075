use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradingPair;

/// Order type supported by a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    /// Post-only limit order. Venues without a dedicated variant fall back
    /// to `Limit`.
    LimitMaker,
}

impl OrderType {
    pub fn is_limit_type(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::LimitMaker)
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn opposite(&self) -> TradeType {
        match self {
            TradeType::Buy => TradeType::Sell,
            TradeType::Sell => TradeType::Buy,
        }
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::Buy => write!(f, "BUY"),
            TradeType::Sell => write!(f, "SELL"),
        }
    }
}

/// Position lifecycle action on a derivatives venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionAction {
    Open,
    Close,
    Nil,
}

/// Side of a perpetual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

/// Position accounting mode on a derivatives venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionMode {
    Hedge,
    Oneway,
}

/// Which book price to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceType {
    MidPrice,
    BestBid,
    BestAsk,
    LastTrade,
}

/// A live maker order as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub trading_pair: TradingPair,
    pub client_order_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buy: bool,
    pub created_at: DateTime<Utc>,
}

impl LimitOrder {
    /// Age of the order at `now`. Clamps to zero for restored orders whose
    /// creation time is unknown or in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).max(Duration::zero())
    }
}

/// A confirmed own-trade on a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub trading_pair: TradingPair,
    pub client_order_id: String,
    pub trade_type: TradeType,
    pub price: Decimal,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_type_limit_check() {
        assert!(OrderType::Limit.is_limit_type());
        assert!(OrderType::LimitMaker.is_limit_type());
        assert!(!OrderType::Market.is_limit_type());
    }

    #[test]
    fn trade_type_opposite() {
        assert_eq!(TradeType::Buy.opposite(), TradeType::Sell);
        assert_eq!(TradeType::Sell.opposite(), TradeType::Buy);
    }

    #[test]
    fn limit_order_age_clamps_to_zero() {
        let now = Utc::now();
        let order = LimitOrder {
            trading_pair: "ETH-USDT".parse().unwrap(),
            client_order_id: "c1".to_string(),
            price: dec!(2000),
            quantity: dec!(1),
            is_buy: true,
            created_at: now + Duration::seconds(5),
        };
        assert_eq!(order.age(now), Duration::zero());
        assert_eq!(order.age(now + Duration::seconds(65)), Duration::seconds(60));
    }
}
