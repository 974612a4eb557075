pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod strategy;

pub use config::AppConfig;
pub use error::{CrossmakerError, Result};
pub use gateway::{MarketGateway, PaperGateway, PerpetualGateway};
pub use strategy::{
    FundingRateArbitrageStrategy, HostedFundingArbitrage, LiquidityMiningStrategy, StrategyRunner,
};
