//! Storage trait seams: every subsystem downstream of ingestion talks
//! to storage through one of these, never to a SQL client directly,
//! so `droplets-testing` can swap in an in-memory implementation for
//! tests.

use async_trait::async_trait;
use droplets_chain::{ChainShareBalance, IntegrationPosition, IntegrationEvent, ShareEvent};
use droplets_core::error::DomainError;
use droplets_core::ids::{Address, AssetId, ChainId, TickId};
use droplets_core::model::{Cursor, LeaderboardEntry, ProtocolSnapshot, UserSnapshot};

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_share_events(&self, events: &[ShareEvent]) -> Result<(), DomainError>;
    async fn append_integration_events(&self, events: &[IntegrationEvent]) -> Result<(), DomainError>;

    /// Loads every share event recorded for `chain` at or above
    /// `from_block`, ordered by `(block, log_index)` — used both for
    /// ordinary catch-up and for reorg rewind/replay.
    async fn share_events_from(
        &self,
        chain: ChainId,
        from_block: u64,
    ) -> Result<Vec<ShareEvent>, DomainError>;

    async fn integration_events_from(
        &self,
        chain: ChainId,
        from_block: u64,
    ) -> Result<Vec<IntegrationEvent>, DomainError>;

    /// Deletes every event at or above `from_block` on `chain` — the
    /// write side of reorg rewind.
    async fn delete_from(&self, chain: ChainId, from_block: u64) -> Result<(), DomainError>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn save_share_balance(&self, balance: &ChainShareBalance) -> Result<(), DomainError>;
    async fn load_share_balances(
        &self,
        address: Address,
    ) -> Result<Vec<ChainShareBalance>, DomainError>;
    async fn load_all_share_balances(&self) -> Result<Vec<ChainShareBalance>, DomainError>;

    async fn save_integration_position(
        &self,
        position: &IntegrationPosition,
    ) -> Result<(), DomainError>;
    async fn load_integration_positions(
        &self,
        address: Address,
    ) -> Result<Vec<IntegrationPosition>, DomainError>;
    async fn load_all_integration_positions(&self) -> Result<Vec<IntegrationPosition>, DomainError>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, chain: ChainId, contract_address: Address) -> Result<Option<Cursor>, DomainError>;
    async fn set(&self, cursor: Cursor) -> Result<(), DomainError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_user_snapshot(&self, snapshot: &UserSnapshot) -> Result<(), DomainError>;
    async fn load_user_snapshot(
        &self,
        address: Address,
        tick: TickId,
    ) -> Result<Option<UserSnapshot>, DomainError>;
    /// The most recent snapshot strictly before `tick`, used to seed
    /// `droplets_cumulative` for the next tick.
    async fn latest_user_snapshot_before(
        &self,
        address: Address,
        tick: TickId,
    ) -> Result<Option<UserSnapshot>, DomainError>;

    async fn save_protocol_snapshot(&self, snapshot: &ProtocolSnapshot) -> Result<(), DomainError>;
    async fn load_protocol_snapshot(&self, tick: TickId) -> Result<Option<ProtocolSnapshot>, DomainError>;
    async fn latest_protocol_snapshot(&self) -> Result<Option<ProtocolSnapshot>, DomainError>;

    /// Every address that had a non-excluded position as of `tick` —
    /// the accrual engine's candidate set.
    async fn candidate_addresses(&self, tick: TickId) -> Result<Vec<Address>, DomainError>;

    async fn last_computed_tick(&self) -> Result<Option<TickId>, DomainError>;
}

#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn upsert(&self, entry: &LeaderboardEntry) -> Result<(), DomainError>;
    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, DomainError>;
    async fn get(&self, address: Address) -> Result<Option<LeaderboardEntry>, DomainError>;
}

#[async_trait]
pub trait OracleFeedStore: Send + Sync {
    async fn save_price(
        &self,
        asset: &AssetId,
        block: u64,
        usd_price: &droplets_core::amount::Amount,
        source: &str,
    ) -> Result<(), DomainError>;

    /// Most recent recorded observation for `asset`, used by the
    /// current-round read endpoint.
    async fn latest_price(
        &self,
        asset: &AssetId,
    ) -> Result<Option<droplets_core::model::OraclePrice>, DomainError>;

    async fn price_history(
        &self,
        asset: &AssetId,
        limit: usize,
    ) -> Result<Vec<droplets_core::model::OraclePrice>, DomainError>;
}

/// The single-tick mutual-exclusion lock: `acquire` must be atomic
/// (`SELECT ... FOR UPDATE` / advisory lock in the Postgres
/// implementation) so two scheduler instances can never both compute
/// the same tick.
#[async_trait]
pub trait TickLock: Send + Sync {
    async fn acquire(&self, tick: TickId) -> Result<bool, DomainError>;
    async fn release(&self, tick: TickId) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use droplets_core::ids::TickId;
    use droplets_core::model::{Cursor, LeaderboardEntry};
    use droplets_testing::addresses::{address, chain, TEST_CHAIN_ETH};
    use droplets_testing::MemoryStorage;
    use num_bigint::BigInt;

    use super::*;

    #[tokio::test]
    async fn cursor_round_trips_through_get_and_set() {
        let storage = MemoryStorage::new();
        let who = address(1);
        let c = chain(TEST_CHAIN_ETH);

        assert!(CursorStore::get(&storage, c, who).await.unwrap().is_none());

        storage
            .set(Cursor {
                chain: c,
                contract_address: who,
                last_processed_block: 12_345,
            })
            .await
            .unwrap();

        let cursor = CursorStore::get(&storage, c, who).await.unwrap().unwrap();
        assert_eq!(cursor.last_processed_block, 12_345);

        storage
            .set(Cursor {
                chain: c,
                contract_address: who,
                last_processed_block: 12_400,
            })
            .await
            .unwrap();
        let updated = CursorStore::get(&storage, c, who).await.unwrap().unwrap();
        assert_eq!(updated.last_processed_block, 12_400);
    }

    #[tokio::test]
    async fn leaderboard_top_is_sorted_by_cumulative_droplets_descending() {
        let storage = MemoryStorage::new();
        let low = address(1);
        let high = address(2);

        storage
            .upsert(&LeaderboardEntry {
                address: low,
                droplets_cumulative: BigInt::from(100),
                last_tick: TickId(1),
                ticks_participated: 1,
            })
            .await
            .unwrap();
        storage
            .upsert(&LeaderboardEntry {
                address: high,
                droplets_cumulative: BigInt::from(500),
                last_tick: TickId(1),
                ticks_participated: 1,
            })
            .await
            .unwrap();

        let top = storage.top(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].address, high);
        assert_eq!(top[1].address, low);

        let limited = storage.top(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].address, high);
    }

    #[tokio::test]
    async fn oracle_feed_latest_price_picks_the_highest_block() {
        let storage = MemoryStorage::new();
        let asset = droplets_core::ids::AssetId::from("xETH");

        storage
            .save_price(&asset, 100, &droplets_core::amount::Amount::from_raw(2_000, 6), "test")
            .await
            .unwrap();
        storage
            .save_price(&asset, 200, &droplets_core::amount::Amount::from_raw(2_100, 6), "test")
            .await
            .unwrap();

        let latest = storage.latest_price(&asset).await.unwrap().unwrap();
        assert_eq!(latest.block, 200);

        let history = storage.price_history(&asset, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].block, 200);
        assert_eq!(history[1].block, 100);
    }

    #[tokio::test]
    async fn tick_lock_only_one_acquirer_succeeds_until_release() {
        let storage = MemoryStorage::new();
        let tick = TickId(7);

        assert!(storage.acquire(tick).await.unwrap());
        assert!(!storage.acquire(tick).await.unwrap());

        storage.release(tick).await.unwrap();
        assert!(storage.acquire(tick).await.unwrap());
    }
}
