pub mod budget;
pub mod executor;
pub mod funding_arb;
pub mod inventory;
pub mod liquidity_mining;
pub mod runner;
pub mod spread;
pub mod status;
pub mod volatility;

pub use budget::BudgetBook;
pub use executor::{
    ExecutorAction, ExecutorHost, ExecutorRegistry, ExecutorSnapshot, PositionExecutorConfig,
    SimulatedExecutorHost,
};
pub use funding_arb::{
    ArbState, BestCombination, FundingArbParams, FundingArbitrage, FundingRateArbitrageStrategy,
    HostedFundingArbitrage, FUNDING_PROFITABILITY_INTERVAL_SECS,
};
pub use inventory::{bid_ask_ratios_from_base_ratio, BidAskRatios};
pub use liquidity_mining::{LiquidityMiningParams, LiquidityMiningStrategy, MarketState};
pub use runner::{RunnerHandle, StrategyEvent, StrategyRunner, TickStrategy};
pub use spread::{SpreadParams, SpreadQuote, SpreadSource};
pub use volatility::VolatilityEstimator;
