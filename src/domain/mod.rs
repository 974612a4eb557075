pub mod funding;
pub mod market;
pub mod order;

pub use funding::{FundingInfo, FundingPayment};
pub use market::{PriceSize, Proposal, TradeFee, TradingPair};
pub use order::{
    LimitOrder, OrderFilledEvent, OrderType, PositionAction, PositionMode, PositionSide, PriceType,
    TradeType,
};
