//! Per-vault price-per-share lookups. A vault publishes its own PPS at
//! round boundaries; the accrual engine needs the PPS in effect at or
//! before a given tick's reference block, with the same
//! no-interpolation discipline the oracle client uses for external
//! prices.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use droplets_core::amount::Amount;
use droplets_core::error::{DomainError, NotFoundError};
use droplets_core::ids::{AssetId, BlockNumber, ChainId};

#[derive(Default)]
pub struct PpsBook {
    series: RwLock<HashMap<(ChainId, AssetId), BTreeMap<BlockNumber, Amount>>>,
}

impl PpsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, chain: ChainId, asset: AssetId, block: BlockNumber, pps: Amount) {
        self.series
            .write()
            .unwrap()
            .entry((chain, asset))
            .or_default()
            .insert(block, pps);
    }

    pub fn pps_at(
        &self,
        chain: ChainId,
        asset: &AssetId,
        at_block: BlockNumber,
    ) -> Result<Amount, DomainError> {
        let series = self.series.read().unwrap();
        let observations = series
            .get(&(chain, asset.clone()))
            .ok_or_else(|| NotFoundError::Asset(asset.clone()))?;
        observations
            .range(..=at_block)
            .next_back()
            .map(|(_, pps)| pps.clone())
            .ok_or_else(|| NotFoundError::Asset(asset.clone()).into())
    }
}
