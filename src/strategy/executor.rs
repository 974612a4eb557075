//! Position executor actions
//!
//! The funding-arbitrage core does not manage positions itself; it emits
//! create/stop actions for external position executors and reads their
//! aggregate PnL back through a registry. The pair of create actions for an
//! arbitrage is always returned together so the host can dispatch it
//! atomically and roll back on partial failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::{OrderType, TradeType, TradingPair};
use crate::error::Result;

/// Configuration for a single directional position executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionExecutorConfig {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub venue: String,
    pub trading_pair: TradingPair,
    pub side: TradeType,
    pub amount: Decimal,
    pub leverage: u32,
    pub open_order_type: OrderType,
}

impl PositionExecutorConfig {
    pub fn market_open(
        timestamp: DateTime<Utc>,
        venue: &str,
        trading_pair: TradingPair,
        side: TradeType,
        amount: Decimal,
        leverage: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            venue: venue.to_string(),
            trading_pair,
            side,
            amount,
            leverage,
            open_order_type: OrderType::Market,
        }
    }
}

/// An action the strategy asks the executor host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorAction {
    Create(PositionExecutorConfig),
    Stop { executor_id: String },
}

/// Read-only view of one executor's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSnapshot {
    pub id: String,
    pub net_pnl_quote: Decimal,
    pub is_active: bool,
}

/// Read access to the executors owned by the host.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutorRegistry: Send + Sync {
    fn executors(&self) -> Vec<ExecutorSnapshot>;
}

/// Dispatch side of the executor host. Creates for one arbitrage arrive as
/// one batch; a failed batch must leave no executor running.
#[async_trait]
pub trait ExecutorHost: Send + Sync {
    async fn dispatch(&self, actions: Vec<ExecutorAction>) -> Result<()>;
}

/// In-memory executor host for the dry-run binary and scenario tests.
/// Created executors start flat; tests can adjust their PnL.
#[derive(Default)]
pub struct SimulatedExecutorHost {
    executors: RwLock<HashMap<String, ExecutorSnapshot>>,
}

impl SimulatedExecutorHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_net_pnl(&self, executor_id: &str, net_pnl_quote: Decimal) {
        let mut executors = self.executors.write().unwrap_or_else(|e| e.into_inner());
        if let Some(snapshot) = executors.get_mut(executor_id) {
            snapshot.net_pnl_quote = net_pnl_quote;
        }
    }
}

impl ExecutorRegistry for SimulatedExecutorHost {
    fn executors(&self) -> Vec<ExecutorSnapshot> {
        self.executors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExecutorHost for SimulatedExecutorHost {
    async fn dispatch(&self, actions: Vec<ExecutorAction>) -> Result<()> {
        let mut executors = self.executors.write().unwrap_or_else(|e| e.into_inner());
        for action in actions {
            match action {
                ExecutorAction::Create(config) => {
                    executors.insert(
                        config.id.clone(),
                        ExecutorSnapshot {
                            id: config.id,
                            net_pnl_quote: Decimal::ZERO,
                            is_active: true,
                        },
                    );
                }
                ExecutorAction::Stop { executor_id } => {
                    if let Some(snapshot) = executors.get_mut(&executor_id) {
                        snapshot.is_active = false;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn simulated_host_tracks_lifecycle() {
        let host = SimulatedExecutorHost::new();
        let config = PositionExecutorConfig::market_open(
            Utc::now(),
            "binance_perpetual",
            "WIF-USDT".parse().unwrap(),
            TradeType::Buy,
            dec!(50),
            20,
        );
        let id = config.id.clone();

        tokio_test::block_on(host.dispatch(vec![ExecutorAction::Create(config)])).unwrap();
        assert!(host.executors().iter().any(|e| e.id == id && e.is_active));

        host.set_net_pnl(&id, dec!(1.5));
        tokio_test::block_on(host.dispatch(vec![ExecutorAction::Stop {
            executor_id: id.clone(),
        }]))
        .unwrap();
        let snapshot = host
            .executors()
            .into_iter()
            .find(|e| e.id == id)
            .expect("snapshot kept after stop");
        assert!(!snapshot.is_active);
        assert_eq!(snapshot.net_pnl_quote, dec!(1.5));
    }
}
