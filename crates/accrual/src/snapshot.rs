//! Snapshot/accrual engine: the reward core. Turns the balances and
//! positions the balance engine maintains into USD valuations, then
//! droplets, for every candidate address at a tick.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use droplets_core::amount::Amount;
use droplets_core::config::Config;
use droplets_core::error::DomainError;
use droplets_core::ids::{Address, AssetId, BlockNumber, ChainId, TickId};
use droplets_core::model::{AssetLeg, IntegrationLeg, LeaderboardEntry, ProtocolSnapshot, UserSnapshot};
use droplets_oracle::PriceOracle;
use droplets_storage::{BalanceStore, LeaderboardStore, SnapshotStore};
use num_bigint::BigInt;
use tracing::{info, warn};

use crate::pps::PpsBook;

/// The block each chain had reached when this tick's inputs were
/// frozen. Supplied by the scheduler, which is responsible for waiting
/// out the grace window.
#[derive(Debug, Clone)]
pub struct TickInputs {
    pub tick: TickId,
    pub block_per_chain: HashMap<ChainId, BlockRefInfo>,
    /// True if any configured chain had not reached its target block
    /// within the grace window — the resulting snapshot is still
    /// written, but flagged `partial`.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockRefInfo {
    pub number: BlockNumber,
}

pub struct AccrualEngine<S, O> {
    storage: Arc<S>,
    oracle: Arc<O>,
    pps: Arc<PpsBook>,
    config: Config,
    droplets_per_usd_tick: u64,
}

impl<S, O> AccrualEngine<S, O>
where
    S: BalanceStore + SnapshotStore + LeaderboardStore + Send + Sync,
    O: PriceOracle + Send + Sync,
{
    pub fn new(storage: Arc<S>, oracle: Arc<O>, pps: Arc<PpsBook>, config: Config) -> Self {
        let droplets_per_usd_tick: u64 = config
            .tick
            .droplets_per_usd_tick
            .parse()
            .expect("droplets_per_usd_tick must be a valid integer rate");
        Self {
            storage,
            oracle,
            pps,
            config,
            droplets_per_usd_tick,
        }
    }

    fn excluded(&self) -> HashSet<Address> {
        self.config
            .excluded_addresses
            .iter()
            .filter_map(|e| droplets_core::ids::Address::from_hex(&e.address).ok())
            .collect()
    }

    fn asset_scale(&self, asset: &AssetId) -> u32 {
        self.config
            .assets
            .iter()
            .find(|a| &a.id == asset)
            .map(|a| a.scale)
            .unwrap_or(6)
    }

    /// Computes the snapshot for one address at `inputs.tick`. Returns
    /// the `UserSnapshot` so the caller can fold it into the
    /// protocol-wide rollup.
    async fn compute_user_snapshot(
        &self,
        address: Address,
        inputs: &TickInputs,
    ) -> Result<UserSnapshot, DomainError> {
        let excluded = self.excluded().contains(&address);

        let mut assets: BTreeMap<AssetId, AssetLeg> = BTreeMap::new();
        let mut had_unstake = false;

        if !excluded {
            for balance in self.storage.load_share_balances(address).await? {
                let Some(block_info) = inputs.block_per_chain.get(&balance.chain) else {
                    continue;
                };
                let pps = self
                    .pps
                    .pps_at(balance.chain, &balance.asset, block_info.number)?;
                let underlying = balance.shares.mul_then_scale(&pps, pps.scale());
                let price = self
                    .oracle
                    .price_at(&balance.asset, block_info.number)
                    .await?;
                let usd_scale = self.asset_scale(&balance.asset);
                let mut usd_value = underlying.mul_then_scale(&price.usd_price, usd_scale);

                let unstake_suppressed = balance.unstaked_this_tick;
                if unstake_suppressed {
                    // A redeem/unstake landing inside this tick zeroes
                    // that asset leg's USD contribution for the tick
                    // it happened in.
                    usd_value = Amount::zero(usd_scale);
                    had_unstake = true;
                }

                assets.insert(
                    balance.asset.clone(),
                    AssetLeg {
                        shares: balance.shares,
                        underlying,
                        usd_value,
                        unstake_suppressed,
                    },
                );
            }
        }

        let mut integrations = Vec::new();
        if !excluded {
            for position in self.storage.load_integration_positions(address).await? {
                let Some(block_info) = inputs.block_per_chain.get(&position.chain) else {
                    continue;
                };
                let underlying_asset = self
                    .config
                    .integrations
                    .iter()
                    .find(|i| i.id == position.protocol_id)
                    .map(|i| i.underlying_asset.clone());
                let Some(underlying_asset) = underlying_asset else {
                    warn!(protocol = %position.protocol_id, "integration position references unconfigured protocol");
                    continue;
                };
                let price = self
                    .oracle
                    .price_at(&underlying_asset, block_info.number)
                    .await?;
                let usd_scale = self.asset_scale(&underlying_asset);
                let usd_value = position
                    .underlying_amount
                    .mul_then_scale(&price.usd_price, usd_scale);
                integrations.push(IntegrationLeg {
                    protocol_id: position.protocol_id.clone(),
                    underlying_amount: position.underlying_amount,
                    usd_value,
                });
            }
        }

        let usd_scale = self
            .config
            .assets
            .first()
            .map(|a| a.scale)
            .unwrap_or(6);
        let mut total_usd = Amount::zero(usd_scale);
        for leg in assets.values() {
            total_usd = total_usd.checked_add(&leg.usd_value.rescale(usd_scale));
        }
        for leg in &integrations {
            total_usd = total_usd.checked_add(&leg.usd_value.rescale(usd_scale));
        }

        let droplets_this_tick = if excluded {
            BigInt::from(0)
        } else {
            total_usd.droplets_at_rate(self.droplets_per_usd_tick)
        };

        let previous = self
            .storage
            .latest_user_snapshot_before(address, inputs.tick)
            .await?;
        let droplets_cumulative = previous
            .map(|p| p.droplets_cumulative + &droplets_this_tick)
            .unwrap_or_else(|| droplets_this_tick.clone());

        Ok(UserSnapshot {
            address,
            tick: inputs.tick,
            assets,
            integrations,
            total_usd,
            droplets_this_tick,
            droplets_cumulative,
            excluded,
            had_unstake,
        })
    }

    /// Computes the full tick: every candidate address, then the
    /// protocol-wide rollup.
    pub async fn compute_tick(&self, inputs: TickInputs) -> Result<ProtocolSnapshot, DomainError> {
        let candidates = self.storage.candidate_addresses(inputs.tick).await?;
        info!(tick = %inputs.tick, candidates = candidates.len(), "computing tick");

        let mut asset_totals: BTreeMap<AssetId, Amount> = BTreeMap::new();
        let mut protocol_totals: BTreeMap<String, Amount> = BTreeMap::new();
        let mut droplets_this_tick = BigInt::from(0);
        let mut droplets_cumulative = BigInt::from(0);
        let mut unique_users = 0u64;

        for address in candidates {
            let snapshot = self.compute_user_snapshot(address, &inputs).await?;

            for (asset, leg) in &snapshot.assets {
                let entry = asset_totals
                    .entry(asset.clone())
                    .or_insert_with(|| Amount::zero(leg.usd_value.scale()));
                *entry = entry.checked_add(&leg.usd_value);
            }
            for leg in &snapshot.integrations {
                let entry = protocol_totals
                    .entry(leg.protocol_id.clone())
                    .or_insert_with(|| Amount::zero(leg.usd_value.scale()));
                *entry = entry.checked_add(&leg.usd_value);
            }

            if !snapshot.excluded {
                unique_users += 1;
            }
            droplets_this_tick += &snapshot.droplets_this_tick;
            droplets_cumulative += &snapshot.droplets_cumulative;

            self.storage.save_user_snapshot(&snapshot).await?;
            if !snapshot.excluded {
                let ticks_participated = self
                    .storage
                    .get(address)
                    .await?
                    .map(|e| e.ticks_participated + 1)
                    .unwrap_or(1);
                self.storage
                    .upsert(&LeaderboardEntry {
                        address,
                        droplets_cumulative: snapshot.droplets_cumulative.clone(),
                        last_tick: inputs.tick,
                        ticks_participated,
                    })
                    .await?;
            }
        }

        let protocol_snapshot = ProtocolSnapshot {
            tick: inputs.tick,
            asset_totals,
            protocol_totals,
            unique_users,
            droplets_this_tick,
            droplets_cumulative,
            partial: inputs.partial,
        };
        self.storage.save_protocol_snapshot(&protocol_snapshot).await?;

        Ok(protocol_snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droplets_chain::events::ChainShareBalance;
    use droplets_core::config::{AssetConfig, ExcludedAddressConfig, StorageConfig, TickConfig, VaultConfig};
    use droplets_core::ids::EventKey;
    use droplets_testing::addresses::{address, chain, TEST_CHAIN_ETH};
    use droplets_testing::{FakeOracle, MemoryStorage};

    const USD_SCALE: u32 = 6;
    const PPS_SCALE: u32 = 18;

    fn test_config(excluded: Vec<ExcludedAddressConfig>) -> Config {
        Config {
            chains: vec![],
            assets: vec![AssetConfig {
                id: AssetId::from("xETH"),
                oracle_feed: "https://example.invalid/xeth".to_string(),
                scale: USD_SCALE,
                vaults: vec![VaultConfig {
                    chain: chain(TEST_CHAIN_ETH),
                    asset: AssetId::from("xETH"),
                    address: address(1).to_string(),
                    deployment_block: 0,
                    pps_scale: PPS_SCALE,
                }],
            }],
            integrations: vec![],
            excluded_addresses: excluded,
            tick: TickConfig {
                interval_seconds: 3600,
                genesis_unix: 0,
                droplets_per_usd_tick: "1".to_string(),
                grace_window_seconds: 900,
            },
            rpc: Default::default(),
            storage: StorageConfig {
                database_url: "postgres://unused".to_string(),
                pool_size: 1,
            },
            api: Default::default(),
        }
    }

    async fn seed_holder(storage: &MemoryStorage, who: Address, shares: u64, unstaked_this_tick: bool) {
        storage
            .save_share_balance(&ChainShareBalance {
                address: who,
                chain: chain(TEST_CHAIN_ETH),
                asset: AssetId::from("xETH"),
                shares: Amount::from_raw(shares, PPS_SCALE),
                last_event: Some(EventKey {
                    chain: chain(TEST_CHAIN_ETH),
                    tx_hash: droplets_core::ids::TxHash([1u8; 32]),
                    log_index: 0,
                }),
                unstaked_this_tick,
            })
            .await
            .unwrap();
    }

    fn inputs(tick: u64) -> TickInputs {
        let mut block_per_chain = HashMap::new();
        block_per_chain.insert(chain(TEST_CHAIN_ETH), BlockRefInfo { number: 1_000 });
        TickInputs {
            tick: TickId(tick),
            block_per_chain,
            partial: false,
        }
    }

    #[tokio::test]
    async fn values_a_plain_holder_in_usd_and_droplets() {
        let storage = Arc::new(MemoryStorage::new());
        let holder = address(2);
        seed_holder(&storage, holder, 1_000_000_000_000_000_000, false).await;

        let pps = Arc::new(PpsBook::new());
        pps.record(
            chain(TEST_CHAIN_ETH),
            AssetId::from("xETH"),
            0,
            Amount::from_raw(BigInt::from(10u64).pow(PPS_SCALE), PPS_SCALE),
        );

        let oracle = Arc::new(FakeOracle::new());
        oracle.seed(&AssetId::from("xETH"), 0, Amount::from_raw(2_000i64 * 1_000_000, USD_SCALE));

        let config = test_config(vec![]);
        let eng = AccrualEngine::new(storage.clone(), oracle, pps, config);

        let snapshot = eng.compute_tick(inputs(1)).await.unwrap();
        assert_eq!(snapshot.unique_users, 1);
        assert_eq!(snapshot.droplets_this_tick, BigInt::from(2_000));
        assert!(!snapshot.partial);

        let entry = storage.get(holder).await.unwrap().expect("leaderboard entry");
        assert_eq!(entry.droplets_cumulative, BigInt::from(2_000));
        assert_eq!(entry.ticks_participated, 1);
    }

    #[tokio::test]
    async fn unstake_mid_tick_suppresses_that_legs_usd() {
        let storage = Arc::new(MemoryStorage::new());
        let holder = address(3);
        seed_holder(&storage, holder, 1_000_000_000_000_000_000, true).await;

        let pps = Arc::new(PpsBook::new());
        pps.record(
            chain(TEST_CHAIN_ETH),
            AssetId::from("xETH"),
            0,
            Amount::from_raw(BigInt::from(10u64).pow(PPS_SCALE), PPS_SCALE),
        );
        let oracle = Arc::new(FakeOracle::new());
        oracle.seed(&AssetId::from("xETH"), 0, Amount::from_raw(2_000i64 * 1_000_000, USD_SCALE));

        let eng = AccrualEngine::new(storage.clone(), oracle, pps, test_config(vec![]));
        let snapshot = eng.compute_tick(inputs(1)).await.unwrap();

        assert_eq!(snapshot.droplets_this_tick, BigInt::from(0));
        assert!(snapshot.asset_totals.get(&AssetId::from("xETH")).unwrap().is_zero());
    }

    #[tokio::test]
    async fn excluded_address_earns_nothing_and_skips_the_leaderboard() {
        let storage = Arc::new(MemoryStorage::new());
        let holder = address(4);
        seed_holder(&storage, holder, 1_000_000_000_000_000_000, false).await;

        let pps = Arc::new(PpsBook::new());
        pps.record(
            chain(TEST_CHAIN_ETH),
            AssetId::from("xETH"),
            0,
            Amount::from_raw(BigInt::from(10u64).pow(PPS_SCALE), PPS_SCALE),
        );
        let oracle = Arc::new(FakeOracle::new());
        oracle.seed(&AssetId::from("xETH"), 0, Amount::from_raw(2_000i64 * 1_000_000, USD_SCALE));

        let config = test_config(vec![ExcludedAddressConfig {
            address: holder.to_string(),
            reason: "treasury".to_string(),
        }]);
        let eng = AccrualEngine::new(storage.clone(), oracle, pps, config);
        let snapshot = eng.compute_tick(inputs(1)).await.unwrap();

        assert_eq!(snapshot.unique_users, 0);
        assert_eq!(snapshot.droplets_this_tick, BigInt::from(0));
        assert!(storage.get(holder).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn same_inputs_produce_the_same_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        let holder = address(5);
        seed_holder(&storage, holder, 1_000_000_000_000_000_000, false).await;

        let pps = Arc::new(PpsBook::new());
        pps.record(
            chain(TEST_CHAIN_ETH),
            AssetId::from("xETH"),
            0,
            Amount::from_raw(BigInt::from(10u64).pow(PPS_SCALE), PPS_SCALE),
        );
        let oracle = Arc::new(FakeOracle::new());
        oracle.seed(&AssetId::from("xETH"), 0, Amount::from_raw(2_000i64 * 1_000_000, USD_SCALE));

        let eng = AccrualEngine::new(storage, oracle, pps, test_config(vec![]));
        let first = eng.compute_tick(inputs(1)).await.unwrap();
        let second = eng.compute_tick(inputs(1)).await.unwrap();

        assert_eq!(first.droplets_this_tick, second.droplets_this_tick);
        assert_eq!(first.asset_totals, second.asset_totals);
    }
}
