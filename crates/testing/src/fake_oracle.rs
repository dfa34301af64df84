//! A scriptable price oracle for tests: seed exact observations and
//! assert on exact accrual results, instead of depending on network
//! access the way `HttpPriceOracle` does.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use droplets_core::amount::Amount;
use droplets_core::error::{DomainError, OracleError};
use droplets_core::ids::{AssetId, BlockNumber};
use droplets_core::model::OraclePrice;
use droplets_oracle::PriceOracle;

#[derive(Default)]
pub struct FakeOracle {
    series: RwLock<HashMap<AssetId, BTreeMap<BlockNumber, Amount>>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, asset: &AssetId, block: BlockNumber, price: Amount) {
        self.series
            .write()
            .unwrap()
            .entry(asset.clone())
            .or_default()
            .insert(block, price);
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn price_at(&self, asset: &AssetId, at_block: BlockNumber) -> Result<OraclePrice, DomainError> {
        let series = self.series.read().unwrap();
        let observations = series
            .get(asset)
            .ok_or_else(|| OracleError::NoFeed(asset.clone()))?;
        observations
            .range(..=at_block)
            .next_back()
            .map(|(block, price)| OraclePrice {
                asset: asset.clone(),
                block: *block,
                usd_price: price.clone(),
                source: "fake".to_string(),
            })
            .ok_or_else(|| {
                OracleError::Unavailable {
                    asset: asset.clone(),
                    block: at_block,
                }
                .into()
            })
    }
}
