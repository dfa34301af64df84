//! Scheduler: computes tick boundaries, catches up on any ticks
//! missed while the process was down, and enforces the single-tick
//! lock so two instances never compute the same tick concurrently.

use std::sync::Arc;

use chrono::Utc;
use droplets_core::config::TickConfig;
use droplets_core::error::{DomainError, SchedulerLockHeldError};
use droplets_core::ids::{ChainId, TickId};
use droplets_rpc::ChainClient;
use droplets_storage::TickLock;
use tracing::{info, warn};

use crate::snapshot::{AccrualEngine, BlockRefInfo, TickInputs};

pub struct Scheduler<S, L> {
    storage: Arc<S>,
    lock: Arc<L>,
    tick_config: TickConfig,
    chains: Vec<ChainId>,
}

impl<S, L> Scheduler<S, L>
where
    S: droplets_storage::SnapshotStore + Send + Sync,
    L: TickLock + Send + Sync,
{
    pub fn new(storage: Arc<S>, lock: Arc<L>, tick_config: TickConfig, chains: Vec<ChainId>) -> Self {
        Self {
            storage,
            lock,
            tick_config,
            chains,
        }
    }

    /// The tick boundary that should be current right now, given
    /// `genesis_unix` and `interval_seconds`. Ticks are a pure function
    /// of wall-clock time, not of when the scheduler happens to run.
    pub fn current_tick(&self) -> TickId {
        let now = Utc::now().timestamp();
        self.tick_for_timestamp(now)
    }

    pub fn tick_for_timestamp(&self, unix_ts: i64) -> TickId {
        let elapsed = (unix_ts - self.tick_config.genesis_unix).max(0);
        TickId((elapsed / self.tick_config.interval_seconds.max(1)) as u64)
    }

    /// Every tick at or before `current_tick()` that hasn't been
    /// computed yet, oldest first — the catch-up set.
    pub async fn pending_ticks(&self) -> Result<Vec<TickId>, DomainError> {
        let current = self.current_tick();
        let last = self.storage.last_computed_tick().await?;
        let start = last.map(|t| t.next()).unwrap_or(TickId(0));
        if start.0 > current.0 {
            return Ok(Vec::new());
        }
        Ok((start.0..=current.0).map(TickId).collect())
    }

    /// Freezes each configured chain's block at or below the tick's
    /// target timestamp, waiting out the grace window for any chain
    /// that hasn't reached it yet before marking the tick `partial`.
    pub async fn freeze_inputs(
        &self,
        client: &dyn ChainClient,
        tick: TickId,
    ) -> Result<TickInputs, DomainError> {
        let target_ts =
            self.tick_config.genesis_unix + tick.0 as i64 * self.tick_config.interval_seconds;
        let deadline = target_ts + self.tick_config.grace_window_seconds;

        let mut block_per_chain = std::collections::HashMap::new();
        let mut partial = false;

        for &chain in &self.chains {
            let mut resolved = None;
            loop {
                let head = client.get_block_number(chain).await?;
                let head_ts = client.get_block_timestamp(chain, head).await?;
                if head_ts >= target_ts {
                    resolved = Some(head);
                    break;
                }
                if Utc::now().timestamp() >= deadline {
                    warn!(%chain, tick = %tick, "chain did not reach tick boundary within grace window");
                    partial = true;
                    resolved = Some(head);
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
            block_per_chain.insert(chain, BlockRefInfo { number: resolved.unwrap() });
        }

        Ok(TickInputs {
            tick,
            block_per_chain,
            partial,
        })
    }

    /// Runs one tick end-to-end under the single-tick lock: acquire,
    /// compute, release. Returns `SchedulerLockHeld` immediately if
    /// another instance already holds the lock rather than waiting
    /// for it.
    pub async fn run_tick<O>(
        &self,
        client: &dyn ChainClient,
        engine: &AccrualEngine<S, O>,
        tick: TickId,
    ) -> Result<(), DomainError>
    where
        O: droplets_oracle::PriceOracle + Send + Sync,
        S: droplets_storage::BalanceStore + droplets_storage::LeaderboardStore,
    {
        if !self.lock.acquire(tick).await? {
            return Err(SchedulerLockHeldError(tick).into());
        }

        let result = async {
            let inputs = self.freeze_inputs(client, tick).await?;
            engine.compute_tick(inputs).await?;
            Ok::<(), DomainError>(())
        }
        .await;

        self.lock.release(tick).await?;
        if result.is_ok() {
            info!(tick = %tick, "tick computed");
        }
        result
    }

    /// Drives the catch-up loop: computes every pending tick in order,
    /// stopping at the first failure so later ticks never run ahead of
    /// an unresolved earlier one.
    pub async fn catch_up<O>(
        &self,
        client: &dyn ChainClient,
        engine: &AccrualEngine<S, O>,
    ) -> Result<Vec<TickId>, DomainError>
    where
        O: droplets_oracle::PriceOracle + Send + Sync,
        S: droplets_storage::BalanceStore + droplets_storage::LeaderboardStore,
    {
        let mut computed = Vec::new();
        for tick in self.pending_ticks().await? {
            self.run_tick(client, engine, tick).await?;
            computed.push(tick);
        }
        Ok(computed)
    }
}
