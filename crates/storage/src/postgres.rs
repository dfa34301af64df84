//! Postgres-backed implementations of the storage traits, via
//! `deadpool-postgres`/`tokio-postgres` — the same pairing used
//! elsewhere in the pack for async Postgres access.

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use droplets_chain::events::{ChainShareBalance, ShareEvent, ShareEventKind};
use droplets_chain::integration::{IntegrationEvent, IntegrationEventKind, IntegrationPosition};
use droplets_core::amount::Amount;
use droplets_core::config::StorageConfig;
use droplets_core::error::DomainError;
use droplets_core::ids::{Address, AssetId, ChainId, EventKey, TickId, TxHash};
use droplets_core::model::{
    Cursor, IntegrationKind, LeaderboardEntry, OraclePrice, ProtocolSnapshot, UserSnapshot,
};
use tokio_postgres::NoTls;

use crate::codec::{
    address_from_bytes, address_to_bytes, amount_from_parts, amount_to_parts, bigint_from_text,
    bigint_to_text, chain_id, tx_hash_from_bytes, tx_hash_to_bytes,
};
use crate::traits::{
    BalanceStore, CursorStore, EventStore, LeaderboardStore, OracleFeedStore, SnapshotStore, TickLock,
};

fn map_pg(err: tokio_postgres::Error) -> DomainError {
    DomainError::Storage(err.to_string())
}

fn map_pool(err: deadpool_postgres::PoolError) -> DomainError {
    DomainError::Storage(err.to_string())
}

#[derive(Clone)]
pub struct PostgresStorage {
    pool: Pool,
}

impl PostgresStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self, DomainError> {
        let mut pool_config = PoolConfig::new();
        pool_config.url = Some(config.database_url.clone());
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DomainError::Storage(e.to_string()))?;

        let client = pool.get().await.map_err(map_pool)?;
        crate::migrations::run(&client).await.map_err(map_pg)?;

        Ok(Self { pool })
    }

    fn kind_str(kind: ShareEventKind) -> &'static str {
        match kind {
            ShareEventKind::Stake => "stake",
            ShareEventKind::Unstake => "unstake",
            ShareEventKind::Redeem => "redeem",
            ShareEventKind::TransferIn => "transfer_in",
            ShareEventKind::TransferOut => "transfer_out",
            ShareEventKind::BridgeIn => "bridge_in",
            ShareEventKind::BridgeOut => "bridge_out",
        }
    }

    fn kind_from_str(s: &str) -> ShareEventKind {
        match s {
            "stake" => ShareEventKind::Stake,
            "unstake" => ShareEventKind::Unstake,
            "redeem" => ShareEventKind::Redeem,
            "transfer_in" => ShareEventKind::TransferIn,
            "transfer_out" => ShareEventKind::TransferOut,
            "bridge_in" => ShareEventKind::BridgeIn,
            _ => ShareEventKind::BridgeOut,
        }
    }
}

#[async_trait]
impl EventStore for PostgresStorage {
    async fn append_share_events(&self, events: &[ShareEvent]) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        for event in events {
            let (magnitude, scale) = amount_to_parts(&event.shares_delta);
            client
                .execute(
                    "INSERT INTO share_events
                        (chain_id, tx_hash, log_index, address, asset, kind,
                         shares_delta_magnitude, scale, block_number)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                     ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING",
                    &[
                        &chain_id(event.chain),
                        &tx_hash_to_bytes(event.key.tx_hash),
                        &(event.key.log_index as i32),
                        &address_to_bytes(event.address),
                        &event.asset.0,
                        &Self::kind_str(event.kind),
                        &magnitude,
                        &scale,
                        &(event.block as i64),
                    ],
                )
                .await
                .map_err(map_pg)?;
        }
        Ok(())
    }

    async fn append_integration_events(&self, events: &[IntegrationEvent]) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        for event in events {
            let (magnitude, scale) = amount_to_parts(&event.underlying_delta);
            let resync = event.resync_to.as_ref().map(|a| amount_to_parts(a).0);
            let kind = match event.kind {
                IntegrationKind::Lp => "lp",
                IntegrationKind::Vault4626 => "vault4626",
                IntegrationKind::Lending => "lending",
            };
            let event_kind = match event.event_kind {
                IntegrationEventKind::Mint => "mint",
                IntegrationEventKind::Burn => "burn",
                IntegrationEventKind::Resync => "resync",
            };
            client
                .execute(
                    "INSERT INTO integration_events
                        (chain_id, tx_hash, log_index, address, protocol_id, kind,
                         event_kind, underlying_delta_magnitude, resync_to_magnitude, scale, block_number)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                     ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING",
                    &[
                        &chain_id(event.chain),
                        &tx_hash_to_bytes(event.key.tx_hash),
                        &(event.key.log_index as i32),
                        &address_to_bytes(event.address),
                        &event.protocol_id,
                        &kind,
                        &event_kind,
                        &magnitude,
                        &resync,
                        &scale,
                        &(event.block as i64),
                    ],
                )
                .await
                .map_err(map_pg)?;
        }
        Ok(())
    }

    async fn share_events_from(
        &self,
        chain: ChainId,
        from_block: u64,
    ) -> Result<Vec<ShareEvent>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT tx_hash, log_index, address, asset, kind, shares_delta_magnitude, scale, block_number
                 FROM share_events
                 WHERE chain_id = $1 AND block_number >= $2
                 ORDER BY block_number, log_index",
                &[&chain_id(chain), &(from_block as i64)],
            )
            .await
            .map_err(map_pg)?;

        Ok(rows
            .iter()
            .map(|row| {
                let tx_hash: Vec<u8> = row.get(0);
                let log_index: i32 = row.get(1);
                let address: Vec<u8> = row.get(2);
                let asset: String = row.get(3);
                let kind: String = row.get(4);
                let magnitude: String = row.get(5);
                let scale: i32 = row.get(6);
                let block_number: i64 = row.get(7);
                ShareEvent {
                    key: EventKey {
                        chain,
                        tx_hash: tx_hash_from_bytes(&tx_hash),
                        log_index: log_index as u32,
                    },
                    address: address_from_bytes(&address),
                    chain,
                    asset: AssetId(asset),
                    kind: Self::kind_from_str(&kind),
                    shares_delta: amount_from_parts(&magnitude, scale),
                    block: block_number as u64,
                }
            })
            .collect())
    }

    async fn integration_events_from(
        &self,
        chain: ChainId,
        from_block: u64,
    ) -> Result<Vec<IntegrationEvent>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT tx_hash, log_index, address, protocol_id, kind, event_kind,
                        underlying_delta_magnitude, resync_to_magnitude, scale, block_number
                 FROM integration_events
                 WHERE chain_id = $1 AND block_number >= $2
                 ORDER BY block_number, log_index",
                &[&chain_id(chain), &(from_block as i64)],
            )
            .await
            .map_err(map_pg)?;

        Ok(rows
            .iter()
            .map(|row| {
                let tx_hash: Vec<u8> = row.get(0);
                let log_index: i32 = row.get(1);
                let address: Vec<u8> = row.get(2);
                let protocol_id: String = row.get(3);
                let kind: String = row.get(4);
                let event_kind: String = row.get(5);
                let magnitude: String = row.get(6);
                let resync: Option<String> = row.get(7);
                let scale: i32 = row.get(8);
                let block_number: i64 = row.get(9);
                IntegrationEvent {
                    key: EventKey {
                        chain,
                        tx_hash: tx_hash_from_bytes(&tx_hash),
                        log_index: log_index as u32,
                    },
                    address: address_from_bytes(&address),
                    chain,
                    protocol_id,
                    kind: match kind.as_str() {
                        "lp" => IntegrationKind::Lp,
                        "vault4626" => IntegrationKind::Vault4626,
                        _ => IntegrationKind::Lending,
                    },
                    event_kind: match event_kind.as_str() {
                        "mint" => IntegrationEventKind::Mint,
                        "burn" => IntegrationEventKind::Burn,
                        _ => IntegrationEventKind::Resync,
                    },
                    underlying_delta: amount_from_parts(&magnitude, scale),
                    resync_to: resync.map(|r| amount_from_parts(&r, scale)),
                    block: block_number as u64,
                }
            })
            .collect())
    }

    async fn delete_from(&self, chain: ChainId, from_block: u64) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        client
            .execute(
                "DELETE FROM share_events WHERE chain_id = $1 AND block_number >= $2",
                &[&chain_id(chain), &(from_block as i64)],
            )
            .await
            .map_err(map_pg)?;
        client
            .execute(
                "DELETE FROM integration_events WHERE chain_id = $1 AND block_number >= $2",
                &[&chain_id(chain), &(from_block as i64)],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for PostgresStorage {
    async fn save_share_balance(&self, balance: &ChainShareBalance) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let (magnitude, scale) = amount_to_parts(&balance.shares);
        let (last_tx, last_idx): (Option<Vec<u8>>, Option<i32>) = match balance.last_event {
            Some(key) => (Some(tx_hash_to_bytes(key.tx_hash)), Some(key.log_index as i32)),
            None => (None, None),
        };
        client
            .execute(
                "INSERT INTO chain_share_balances
                    (address, chain_id, asset, shares_magnitude, scale, last_event_tx_hash, last_event_log_index)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (address, chain_id, asset) DO UPDATE SET
                    shares_magnitude = EXCLUDED.shares_magnitude,
                    scale = EXCLUDED.scale,
                    last_event_tx_hash = EXCLUDED.last_event_tx_hash,
                    last_event_log_index = EXCLUDED.last_event_log_index",
                &[
                    &address_to_bytes(balance.address),
                    &chain_id(balance.chain),
                    &balance.asset.0,
                    &magnitude,
                    &scale,
                    &last_tx,
                    &last_idx,
                ],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }

    async fn load_share_balances(&self, address: Address) -> Result<Vec<ChainShareBalance>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT chain_id, asset, shares_magnitude, scale, last_event_tx_hash, last_event_log_index
                 FROM chain_share_balances WHERE address = $1",
                &[&address_to_bytes(address)],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows.iter().map(|row| row_to_share_balance(address, row)).collect())
    }

    async fn load_all_share_balances(&self) -> Result<Vec<ChainShareBalance>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT address, chain_id, asset, shares_magnitude, scale, last_event_tx_hash, last_event_log_index
                 FROM chain_share_balances",
                &[],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows
            .iter()
            .map(|row| {
                let address: Vec<u8> = row.get(0);
                row_to_share_balance(address_from_bytes(&address), &shift_row(row))
            })
            .collect())
    }

    async fn save_integration_position(&self, position: &IntegrationPosition) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let (magnitude, scale) = amount_to_parts(&position.underlying_amount);
        let kind = match position.kind {
            IntegrationKind::Lp => "lp",
            IntegrationKind::Vault4626 => "vault4626",
            IntegrationKind::Lending => "lending",
        };
        client
            .execute(
                "INSERT INTO integration_positions
                    (address, chain_id, protocol_id, kind, underlying_amount_magnitude, scale)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (address, chain_id, protocol_id) DO UPDATE SET
                    underlying_amount_magnitude = EXCLUDED.underlying_amount_magnitude,
                    scale = EXCLUDED.scale",
                &[
                    &address_to_bytes(position.address),
                    &chain_id(position.chain),
                    &position.protocol_id,
                    &kind,
                    &magnitude,
                    &scale,
                ],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }

    async fn load_integration_positions(
        &self,
        address: Address,
    ) -> Result<Vec<IntegrationPosition>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT chain_id, protocol_id, kind, underlying_amount_magnitude, scale
                 FROM integration_positions WHERE address = $1",
                &[&address_to_bytes(address)],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows.iter().map(|row| row_to_integration_position(address, row)).collect())
    }

    async fn load_all_integration_positions(&self) -> Result<Vec<IntegrationPosition>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT address, chain_id, protocol_id, kind, underlying_amount_magnitude, scale
                 FROM integration_positions",
                &[],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows
            .iter()
            .map(|row| {
                let address: Vec<u8> = row.get(0);
                row_to_integration_position(address_from_bytes(&address), &shift_row(row))
            })
            .collect())
    }
}

/// `load_all_*` queries select one extra leading `address` column; this
/// shifts a row's column index by one so the same per-row mapper can
/// serve both the per-address and the all-addresses query.
fn shift_row(row: &tokio_postgres::Row) -> ShiftedRow<'_> {
    ShiftedRow(row)
}

struct ShiftedRow<'a>(&'a tokio_postgres::Row);

impl<'a> ShiftedRow<'a> {
    fn get<T: for<'b> tokio_postgres::types::FromSql<'b>>(&self, idx: usize) -> T {
        self.0.get(idx + 1)
    }
}

fn row_to_share_balance(address: Address, row: &impl RowLike) -> ChainShareBalance {
    let chain_id: i64 = row.get(0);
    let asset: String = row.get(1);
    let magnitude: String = row.get(2);
    let scale: i32 = row.get(3);
    let last_tx: Option<Vec<u8>> = row.get(4);
    let last_idx: Option<i32> = row.get(5);
    ChainShareBalance {
        address,
        chain: ChainId(chain_id as u64),
        asset: AssetId(asset),
        shares: amount_from_parts(&magnitude, scale),
        last_event: match (last_tx, last_idx) {
            (Some(tx), Some(idx)) => Some(EventKey {
                chain: ChainId(chain_id as u64),
                tx_hash: tx_hash_from_bytes(&tx),
                log_index: idx as u32,
            }),
            _ => None,
        },
        unstaked_this_tick: false,
    }
}

fn row_to_integration_position(address: Address, row: &impl RowLike) -> IntegrationPosition {
    let chain_id: i64 = row.get(0);
    let protocol_id: String = row.get(1);
    let kind: String = row.get(2);
    let magnitude: String = row.get(3);
    let scale: i32 = row.get(4);
    IntegrationPosition {
        address,
        chain: ChainId(chain_id as u64),
        protocol_id,
        kind: match kind.as_str() {
            "lp" => IntegrationKind::Lp,
            "vault4626" => IntegrationKind::Vault4626,
            _ => IntegrationKind::Lending,
        },
        underlying_amount: amount_from_parts(&magnitude, scale),
        last_event: None,
    }
}

trait RowLike {
    fn get<T: for<'b> tokio_postgres::types::FromSql<'b>>(&self, idx: usize) -> T;
}

impl RowLike for tokio_postgres::Row {
    fn get<T: for<'b> tokio_postgres::types::FromSql<'b>>(&self, idx: usize) -> T {
        tokio_postgres::Row::get(self, idx)
    }
}

impl<'a> RowLike for ShiftedRow<'a> {
    fn get<T: for<'b> tokio_postgres::types::FromSql<'b>>(&self, idx: usize) -> T {
        ShiftedRow::get(self, idx)
    }
}

#[async_trait]
impl CursorStore for PostgresStorage {
    async fn get(&self, chain: ChainId, contract_address: Address) -> Result<Option<Cursor>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT last_processed_block FROM cursors WHERE chain_id = $1 AND contract_address = $2",
                &[&chain_id(chain), &address_to_bytes(contract_address)],
            )
            .await
            .map_err(map_pg)?;
        Ok(row.map(|row| Cursor {
            chain,
            contract_address,
            last_processed_block: row.get::<_, i64>(0) as u64,
        }))
    }

    async fn set(&self, cursor: Cursor) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        client
            .execute(
                "INSERT INTO cursors (chain_id, contract_address, last_processed_block)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (chain_id, contract_address) DO UPDATE SET
                    last_processed_block = EXCLUDED.last_processed_block",
                &[
                    &chain_id(cursor.chain),
                    &address_to_bytes(cursor.contract_address),
                    &(cursor.last_processed_block as i64),
                ],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for PostgresStorage {
    async fn save_user_snapshot(&self, snapshot: &UserSnapshot) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let payload = serde_json::to_value(snapshot).map_err(|e| DomainError::Storage(e.to_string()))?;
        let (magnitude, scale) = amount_to_parts(&snapshot.total_usd);
        client
            .execute(
                "INSERT INTO user_snapshots
                    (address, tick, payload, total_usd_magnitude, total_usd_scale,
                     droplets_this_tick, droplets_cumulative, excluded)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (address, tick) DO UPDATE SET
                    payload = EXCLUDED.payload",
                &[
                    &address_to_bytes(snapshot.address),
                    &(snapshot.tick.0 as i64),
                    &payload,
                    &magnitude,
                    &scale,
                    &bigint_to_text(&snapshot.droplets_this_tick),
                    &bigint_to_text(&snapshot.droplets_cumulative),
                    &snapshot.excluded,
                ],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }

    async fn load_user_snapshot(
        &self,
        address: Address,
        tick: TickId,
    ) -> Result<Option<UserSnapshot>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT payload FROM user_snapshots WHERE address = $1 AND tick = $2",
                &[&address_to_bytes(address), &(tick.0 as i64)],
            )
            .await
            .map_err(map_pg)?;
        row.map(|row| {
            let payload: serde_json::Value = row.get(0);
            serde_json::from_value(payload).map_err(|e| DomainError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn latest_user_snapshot_before(
        &self,
        address: Address,
        tick: TickId,
    ) -> Result<Option<UserSnapshot>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT payload FROM user_snapshots
                 WHERE address = $1 AND tick < $2
                 ORDER BY tick DESC LIMIT 1",
                &[&address_to_bytes(address), &(tick.0 as i64)],
            )
            .await
            .map_err(map_pg)?;
        row.map(|row| {
            let payload: serde_json::Value = row.get(0);
            serde_json::from_value(payload).map_err(|e| DomainError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn save_protocol_snapshot(&self, snapshot: &ProtocolSnapshot) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let payload = serde_json::to_value(snapshot).map_err(|e| DomainError::Storage(e.to_string()))?;
        client
            .execute(
                "INSERT INTO protocol_snapshots (tick, payload, droplets_this_tick, droplets_cumulative, partial)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (tick) DO UPDATE SET payload = EXCLUDED.payload",
                &[
                    &(snapshot.tick.0 as i64),
                    &payload,
                    &bigint_to_text(&snapshot.droplets_this_tick),
                    &bigint_to_text(&snapshot.droplets_cumulative),
                    &snapshot.partial,
                ],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }

    async fn load_protocol_snapshot(&self, tick: TickId) -> Result<Option<ProtocolSnapshot>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT payload FROM protocol_snapshots WHERE tick = $1",
                &[&(tick.0 as i64)],
            )
            .await
            .map_err(map_pg)?;
        row.map(|row| {
            let payload: serde_json::Value = row.get(0);
            serde_json::from_value(payload).map_err(|e| DomainError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn latest_protocol_snapshot(&self) -> Result<Option<ProtocolSnapshot>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT payload FROM protocol_snapshots ORDER BY tick DESC LIMIT 1",
                &[],
            )
            .await
            .map_err(map_pg)?;
        row.map(|row| {
            let payload: serde_json::Value = row.get(0);
            serde_json::from_value(payload).map_err(|e| DomainError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn candidate_addresses(&self, tick: TickId) -> Result<Vec<Address>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let previous = tick.previous().map(|t| t.0 as i64).unwrap_or(-1);
        let rows = client
            .query(
                "SELECT DISTINCT address FROM chain_share_balances
                 UNION
                 SELECT DISTINCT address FROM integration_positions
                 UNION
                 SELECT DISTINCT address FROM user_snapshots WHERE tick = $1",
                &[&previous],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows
            .iter()
            .map(|row| address_from_bytes(&row.get::<_, Vec<u8>>(0)))
            .collect())
    }

    async fn last_computed_tick(&self) -> Result<Option<TickId>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt("SELECT MAX(tick) FROM protocol_snapshots", &[])
            .await
            .map_err(map_pg)?;
        Ok(row
            .and_then(|row| row.get::<_, Option<i64>>(0))
            .map(|t| TickId(t as u64)))
    }
}

#[async_trait]
impl LeaderboardStore for PostgresStorage {
    async fn upsert(&self, entry: &LeaderboardEntry) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        client
            .execute(
                "INSERT INTO leaderboard (address, droplets_cumulative, last_tick, ticks_participated)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (address) DO UPDATE SET
                    droplets_cumulative = EXCLUDED.droplets_cumulative,
                    last_tick = EXCLUDED.last_tick,
                    ticks_participated = EXCLUDED.ticks_participated",
                &[
                    &address_to_bytes(entry.address),
                    &bigint_to_text(&entry.droplets_cumulative),
                    &(entry.last_tick.0 as i64),
                    &(entry.ticks_participated as i64),
                ],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }

    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT address, droplets_cumulative, last_tick, ticks_participated
                 FROM leaderboard
                 ORDER BY droplets_cumulative DESC
                 LIMIT $1",
                &[&(limit as i64)],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows.iter().map(row_to_leaderboard_entry).collect())
    }

    async fn get(&self, address: Address) -> Result<Option<LeaderboardEntry>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT address, droplets_cumulative, last_tick, ticks_participated
                 FROM leaderboard WHERE address = $1",
                &[&address_to_bytes(address)],
            )
            .await
            .map_err(map_pg)?;
        Ok(row.as_ref().map(row_to_leaderboard_entry))
    }
}

fn row_to_leaderboard_entry(row: &tokio_postgres::Row) -> LeaderboardEntry {
    let address: Vec<u8> = row.get(0);
    let droplets_cumulative: String = row.get(1);
    let last_tick: i64 = row.get(2);
    let ticks_participated: i64 = row.get(3);
    LeaderboardEntry {
        address: address_from_bytes(&address),
        droplets_cumulative: bigint_from_text(&droplets_cumulative),
        last_tick: TickId(last_tick as u64),
        ticks_participated: ticks_participated as u64,
    }
}

#[async_trait]
impl TickLock for PostgresStorage {
    /// Uses `pg_try_advisory_lock` keyed on the tick number so the lock
    /// is held for the connection's lifetime and released automatically
    /// if the process dies mid-tick.
    async fn acquire(&self, tick: TickId) -> Result<bool, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&(tick.0 as i64)])
            .await
            .map_err(map_pg)?;
        Ok(row.get(0))
    }

    async fn release(&self, tick: TickId) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        client
            .execute("SELECT pg_advisory_unlock($1)", &[&(tick.0 as i64)])
            .await
            .map_err(map_pg)?;
        Ok(())
    }
}

#[async_trait]
impl OracleFeedStore for PostgresStorage {
    async fn save_price(
        &self,
        asset: &AssetId,
        block: u64,
        usd_price: &Amount,
        source: &str,
    ) -> Result<(), DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let (magnitude, scale) = amount_to_parts(usd_price);
        client
            .execute(
                "INSERT INTO oracle_prices (asset, block_number, usd_price_magnitude, scale, source)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (asset, block_number) DO UPDATE SET
                    usd_price_magnitude = EXCLUDED.usd_price_magnitude,
                    source = EXCLUDED.source",
                &[&asset.0, &(block as i64), &magnitude, &scale, &source],
            )
            .await
            .map_err(map_pg)?;
        Ok(())
    }

    async fn latest_price(&self, asset: &AssetId) -> Result<Option<OraclePrice>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let row = client
            .query_opt(
                "SELECT block_number, usd_price_magnitude, scale, source
                 FROM oracle_prices WHERE asset = $1 ORDER BY block_number DESC LIMIT 1",
                &[&asset.0],
            )
            .await
            .map_err(map_pg)?;
        Ok(row.map(|row| row_to_oracle_price(asset.clone(), &row)))
    }

    async fn price_history(&self, asset: &AssetId, limit: usize) -> Result<Vec<OraclePrice>, DomainError> {
        let client = self.pool.get().await.map_err(map_pool)?;
        let rows = client
            .query(
                "SELECT block_number, usd_price_magnitude, scale, source
                 FROM oracle_prices WHERE asset = $1
                 ORDER BY block_number DESC LIMIT $2",
                &[&asset.0, &(limit as i64)],
            )
            .await
            .map_err(map_pg)?;
        Ok(rows
            .iter()
            .map(|row| row_to_oracle_price(asset.clone(), row))
            .collect())
    }
}

fn row_to_oracle_price(asset: AssetId, row: &tokio_postgres::Row) -> OraclePrice {
    let block: i64 = row.get(0);
    let magnitude: String = row.get(1);
    let scale: i32 = row.get(2);
    let source: String = row.get(3);
    OraclePrice {
        asset,
        block: block as u64,
        usd_price: amount_from_parts(&magnitude, scale),
        source,
    }
}
