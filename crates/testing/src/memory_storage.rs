//! An in-memory implementation of every storage trait, so unit and
//! integration tests never need a live Postgres instance.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use droplets_chain::events::ChainShareBalance;
use droplets_chain::integration::IntegrationPosition;
use droplets_chain::{IntegrationEvent, ShareEvent};
use droplets_core::amount::Amount;
use droplets_core::entity::NsKey;
use droplets_core::error::DomainError;
use droplets_core::ids::{Address, AssetId, ChainId, TickId};
use droplets_core::model::{Cursor, LeaderboardEntry, OraclePrice, ProtocolSnapshot, UserSnapshot};
use droplets_storage::{
    BalanceStore, CursorStore, EventStore, LeaderboardStore, OracleFeedStore, SnapshotStore, TickLock,
};

#[derive(Default)]
pub struct MemoryStorage {
    share_events: Mutex<Vec<ShareEvent>>,
    integration_events: Mutex<Vec<IntegrationEvent>>,
    share_balances: Mutex<HashMap<NsKey, ChainShareBalance>>,
    integration_positions: Mutex<HashMap<NsKey, IntegrationPosition>>,
    cursors: Mutex<HashMap<(ChainId, Address), Cursor>>,
    user_snapshots: Mutex<HashMap<(Address, TickId), UserSnapshot>>,
    protocol_snapshots: Mutex<HashMap<TickId, ProtocolSnapshot>>,
    leaderboard: Mutex<HashMap<Address, LeaderboardEntry>>,
    oracle_prices: Mutex<HashMap<AssetId, Vec<OraclePrice>>>,
    locks: Mutex<HashSet<TickId>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn share_key(address: Address, chain: ChainId, asset: &AssetId) -> NsKey {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&address.0);
        bytes.extend_from_slice(&chain.0.to_be_bytes());
        bytes.extend_from_slice(asset.0.as_bytes());
        NsKey::new("chain_share_balance", bytes)
    }

    fn integration_key(address: Address, chain: ChainId, protocol_id: &str) -> NsKey {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&address.0);
        bytes.extend_from_slice(&chain.0.to_be_bytes());
        bytes.extend_from_slice(protocol_id.as_bytes());
        NsKey::new("integration_position", bytes)
    }
}

#[async_trait]
impl EventStore for MemoryStorage {
    async fn append_share_events(&self, events: &[ShareEvent]) -> Result<(), DomainError> {
        self.share_events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    async fn append_integration_events(&self, events: &[IntegrationEvent]) -> Result<(), DomainError> {
        self.integration_events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    async fn share_events_from(&self, chain: ChainId, from_block: u64) -> Result<Vec<ShareEvent>, DomainError> {
        let mut out: Vec<ShareEvent> = self
            .share_events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.chain == chain && e.block >= from_block)
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.block, e.key.log_index));
        Ok(out)
    }

    async fn integration_events_from(
        &self,
        chain: ChainId,
        from_block: u64,
    ) -> Result<Vec<IntegrationEvent>, DomainError> {
        let mut out: Vec<IntegrationEvent> = self
            .integration_events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.chain == chain && e.block >= from_block)
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.block, e.key.log_index));
        Ok(out)
    }

    async fn delete_from(&self, chain: ChainId, from_block: u64) -> Result<(), DomainError> {
        self.share_events
            .lock()
            .unwrap()
            .retain(|e| !(e.chain == chain && e.block >= from_block));
        self.integration_events
            .lock()
            .unwrap()
            .retain(|e| !(e.chain == chain && e.block >= from_block));
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for MemoryStorage {
    async fn save_share_balance(&self, balance: &ChainShareBalance) -> Result<(), DomainError> {
        let key = Self::share_key(balance.address, balance.chain, &balance.asset);
        self.share_balances.lock().unwrap().insert(key, balance.clone());
        Ok(())
    }

    async fn load_share_balances(&self, address: Address) -> Result<Vec<ChainShareBalance>, DomainError> {
        Ok(self
            .share_balances
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.address == address)
            .cloned()
            .collect())
    }

    async fn load_all_share_balances(&self) -> Result<Vec<ChainShareBalance>, DomainError> {
        Ok(self.share_balances.lock().unwrap().values().cloned().collect())
    }

    async fn save_integration_position(&self, position: &IntegrationPosition) -> Result<(), DomainError> {
        let key = Self::integration_key(position.address, position.chain, &position.protocol_id);
        self.integration_positions.lock().unwrap().insert(key, position.clone());
        Ok(())
    }

    async fn load_integration_positions(
        &self,
        address: Address,
    ) -> Result<Vec<IntegrationPosition>, DomainError> {
        Ok(self
            .integration_positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.address == address)
            .cloned()
            .collect())
    }

    async fn load_all_integration_positions(&self) -> Result<Vec<IntegrationPosition>, DomainError> {
        Ok(self.integration_positions.lock().unwrap().values().cloned().collect())
    }
}

#[async_trait]
impl CursorStore for MemoryStorage {
    async fn get(&self, chain: ChainId, contract_address: Address) -> Result<Option<Cursor>, DomainError> {
        Ok(self.cursors.lock().unwrap().get(&(chain, contract_address)).copied())
    }

    async fn set(&self, cursor: Cursor) -> Result<(), DomainError> {
        self.cursors
            .lock()
            .unwrap()
            .insert((cursor.chain, cursor.contract_address), cursor);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn save_user_snapshot(&self, snapshot: &UserSnapshot) -> Result<(), DomainError> {
        self.user_snapshots
            .lock()
            .unwrap()
            .insert((snapshot.address, snapshot.tick), snapshot.clone());
        Ok(())
    }

    async fn load_user_snapshot(&self, address: Address, tick: TickId) -> Result<Option<UserSnapshot>, DomainError> {
        Ok(self.user_snapshots.lock().unwrap().get(&(address, tick)).cloned())
    }

    async fn latest_user_snapshot_before(
        &self,
        address: Address,
        tick: TickId,
    ) -> Result<Option<UserSnapshot>, DomainError> {
        Ok(self
            .user_snapshots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.address == address && s.tick.0 < tick.0)
            .max_by_key(|s| s.tick.0)
            .cloned())
    }

    async fn save_protocol_snapshot(&self, snapshot: &ProtocolSnapshot) -> Result<(), DomainError> {
        self.protocol_snapshots.lock().unwrap().insert(snapshot.tick, snapshot.clone());
        Ok(())
    }

    async fn load_protocol_snapshot(&self, tick: TickId) -> Result<Option<ProtocolSnapshot>, DomainError> {
        Ok(self.protocol_snapshots.lock().unwrap().get(&tick).cloned())
    }

    async fn latest_protocol_snapshot(&self) -> Result<Option<ProtocolSnapshot>, DomainError> {
        Ok(self
            .protocol_snapshots
            .lock()
            .unwrap()
            .values()
            .max_by_key(|s| s.tick.0)
            .cloned())
    }

    async fn candidate_addresses(&self, _tick: TickId) -> Result<Vec<Address>, DomainError> {
        let mut addresses: HashSet<Address> = HashSet::new();
        addresses.extend(self.share_balances.lock().unwrap().values().map(|b| b.address));
        addresses.extend(self.integration_positions.lock().unwrap().values().map(|p| p.address));
        Ok(addresses.into_iter().collect())
    }

    async fn last_computed_tick(&self) -> Result<Option<TickId>, DomainError> {
        Ok(self.protocol_snapshots.lock().unwrap().keys().max_by_key(|t| t.0).copied())
    }
}

#[async_trait]
impl LeaderboardStore for MemoryStorage {
    async fn upsert(&self, entry: &LeaderboardEntry) -> Result<(), DomainError> {
        self.leaderboard.lock().unwrap().insert(entry.address, entry.clone());
        Ok(())
    }

    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, DomainError> {
        let mut entries: Vec<LeaderboardEntry> = self.leaderboard.lock().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| b.droplets_cumulative.cmp(&a.droplets_cumulative));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn get(&self, address: Address) -> Result<Option<LeaderboardEntry>, DomainError> {
        Ok(self.leaderboard.lock().unwrap().get(&address).cloned())
    }
}

#[async_trait]
impl OracleFeedStore for MemoryStorage {
    async fn save_price(
        &self,
        asset: &AssetId,
        block: u64,
        usd_price: &Amount,
        source: &str,
    ) -> Result<(), DomainError> {
        self.oracle_prices
            .lock()
            .unwrap()
            .entry(asset.clone())
            .or_default()
            .push(OraclePrice {
                asset: asset.clone(),
                block,
                usd_price: usd_price.clone(),
                source: source.to_string(),
            });
        Ok(())
    }

    async fn latest_price(&self, asset: &AssetId) -> Result<Option<OraclePrice>, DomainError> {
        Ok(self
            .oracle_prices
            .lock()
            .unwrap()
            .get(asset)
            .and_then(|prices| prices.iter().max_by_key(|p| p.block).cloned()))
    }

    async fn price_history(&self, asset: &AssetId, limit: usize) -> Result<Vec<OraclePrice>, DomainError> {
        let mut prices = self
            .oracle_prices
            .lock()
            .unwrap()
            .get(asset)
            .cloned()
            .unwrap_or_default();
        prices.sort_by_key(|p| std::cmp::Reverse(p.block));
        prices.truncate(limit);
        Ok(prices)
    }
}

#[async_trait]
impl TickLock for MemoryStorage {
    async fn acquire(&self, tick: TickId) -> Result<bool, DomainError> {
        Ok(self.locks.lock().unwrap().insert(tick))
    }

    async fn release(&self, tick: TickId) -> Result<(), DomainError> {
        self.locks.lock().unwrap().remove(&tick);
        Ok(())
    }
}
