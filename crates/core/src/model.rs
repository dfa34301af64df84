//! Shared data-model value types that more than one crate needs to
//! agree on: storage, the accrual engine, and the read API all speak
//! these shapes. The event/entity types that *mutate* balances
//! (`ShareEvent`, `IntegrationEvent`, `ChainShareBalance`,
//! `IntegrationPosition`) live in `droplets-chain`, next to the
//! classification logic that produces and folds them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::ids::{Address, AssetId, ChainId, RoundId, TickId};

/// A configured vault contract: `(chain, asset) -> address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultContract {
    pub chain: ChainId,
    pub asset: AssetId,
    pub address: Address,
    pub deployment_block: u64,
    pub pps_scale: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationKind {
    Lp,
    Vault4626,
    Lending,
}

/// A configured integration protocol that can hold vault shares on a
/// user's behalf: `(id, kind, chain, contract_address, underlying_asset, metadata)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationProtocol {
    pub id: String,
    pub kind: IntegrationKind,
    pub chain: ChainId,
    pub contract_address: Address,
    pub underlying_asset: AssetId,
    pub metadata: serde_json::Value,
}

/// Seed list of addresses excluded from accrual entirely (treasuries,
/// the zero address, integration contracts counted only indirectly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedAddress {
    pub address: Address,
    pub reason: String,
}

/// Per-`(chain, contract_address)` ingest checkpoint: the last block
/// this contract's events have been fully indexed through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cursor {
    pub chain: ChainId,
    pub contract_address: Address,
    pub last_processed_block: u64,
}

/// A vault's own published price-per-share at a round or tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpsObservation {
    pub asset: AssetId,
    pub chain: ChainId,
    pub round_id: RoundId,
    pub pps: Amount,
}

/// An external price-feed reading for an asset at a reference block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OraclePrice {
    pub asset: AssetId,
    pub block: u64,
    pub usd_price: Amount,
    pub source: String,
}

/// Per-asset USD contribution for one address at one tick, part of a
/// [`UserSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetLeg {
    pub shares: Amount,
    pub underlying: Amount,
    pub usd_value: Amount,
    /// True when this leg's USD contribution was zeroed because the
    /// address unstaked or redeemed partway through this tick.
    pub unstake_suppressed: bool,
}

/// USD contribution of one indirect (integration) position, part of a
/// [`UserSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLeg {
    pub protocol_id: String,
    pub underlying_amount: Amount,
    pub usd_value: Amount,
}

/// Immutable per-`(address, tick)` snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub address: Address,
    pub tick: TickId,
    pub assets: BTreeMap<AssetId, AssetLeg>,
    pub integrations: Vec<IntegrationLeg>,
    pub total_usd: Amount,
    pub droplets_this_tick: num_bigint::BigInt,
    pub droplets_cumulative: num_bigint::BigInt,
    pub excluded: bool,
    pub had_unstake: bool,
}

/// Immutable per-tick protocol-wide rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSnapshot {
    pub tick: TickId,
    pub asset_totals: BTreeMap<AssetId, Amount>,
    pub protocol_totals: BTreeMap<String, Amount>,
    pub unique_users: u64,
    pub droplets_this_tick: num_bigint::BigInt,
    pub droplets_cumulative: num_bigint::BigInt,
    /// Set when any chain had not reached its target block for this
    /// tick within the configured grace window.
    pub partial: bool,
}

/// Materialized, incrementally-maintained leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub address: Address,
    pub droplets_cumulative: num_bigint::BigInt,
    pub last_tick: TickId,
    pub ticks_participated: u64,
}
