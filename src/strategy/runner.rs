//! Strategy runner
//!
//! Drives a strategy with clock ticks at a fixed cadence (nominally 1 Hz),
//! serializing ticks with fill and funding-payment callbacks on a single
//! task. Strategy errors become logged warnings; the loop stays live until
//! shutdown, which gives the strategy a chance to unwind its orders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::domain::{FundingPayment, OrderFilledEvent};
use crate::error::Result;
use crate::strategy::funding_arb::HostedFundingArbitrage;
use crate::strategy::liquidity_mining::LiquidityMiningStrategy;

/// Event callbacks a strategy can receive between ticks.
#[derive(Debug, Clone)]
pub enum StrategyEvent {
    Fill(OrderFilledEvent),
    FundingPayment(FundingPayment),
}

/// A strategy the runner can drive.
#[async_trait]
pub trait TickStrategy: Send {
    async fn tick(&mut self, now: DateTime<Utc>) -> Result<()>;

    fn on_event(&mut self, event: StrategyEvent);

    async fn stop(&mut self) -> Result<()>;
}

#[async_trait]
impl TickStrategy for LiquidityMiningStrategy {
    async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        LiquidityMiningStrategy::tick(self, now).await
    }

    fn on_event(&mut self, event: StrategyEvent) {
        if let StrategyEvent::Fill(fill) = event {
            self.on_fill(&fill);
        }
    }

    async fn stop(&mut self) -> Result<()> {
        LiquidityMiningStrategy::stop(self).await;
        Ok(())
    }
}

#[async_trait]
impl TickStrategy for HostedFundingArbitrage {
    async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        HostedFundingArbitrage::tick(self, now).await
    }

    fn on_event(&mut self, event: StrategyEvent) {
        if let StrategyEvent::FundingPayment(payment) = event {
            self.strategy_mut().on_funding_payment(&payment);
        }
    }

    async fn stop(&mut self) -> Result<()> {
        HostedFundingArbitrage::stop(self).await
    }
}

/// Handle for feeding events into a running strategy and shutting it down.
#[derive(Clone)]
pub struct RunnerHandle {
    event_tx: mpsc::Sender<StrategyEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl RunnerHandle {
    pub async fn send_event(&self, event: StrategyEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("strategy runner is gone, event dropped");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Single-task host serializing ticks with event callbacks.
pub struct StrategyRunner<S: TickStrategy> {
    strategy: S,
    tick_interval: Duration,
    event_rx: mpsc::Receiver<StrategyEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: TickStrategy> StrategyRunner<S> {
    pub fn new(strategy: S, tick_interval: Duration) -> (Self, RunnerHandle) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                strategy,
                tick_interval,
                event_rx,
                shutdown_rx,
            },
            RunnerHandle {
                event_tx,
                shutdown_tx,
            },
        )
    }

    pub async fn run(mut self) -> Result<()> {
        info!(interval = ?self.tick_interval, "strategy runner starting");
        let mut clock = tokio::time::interval(self.tick_interval);
        clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = clock.tick() => {
                    if let Err(e) = self.strategy.tick(Utc::now()).await {
                        warn!(error = %e, "tick failed, retrying next tick");
                    }
                }
                Some(event) = self.event_rx.recv() => {
                    self.strategy.on_event(event);
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("strategy runner stopping");
        self.strategy.stop().await?;
        Ok(())
    }
}
