//! Price oracle client: resolves an asset's USD price at a specific
//! reference block, with no interpolation between observations — the
//! accrual engine always asks for the price "as of" a block, never
//! "around" one.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use droplets_core::error::{DomainError, OracleError};
use droplets_core::ids::{AssetId, BlockNumber};
use droplets_core::model::OraclePrice;
use num_bigint::BigInt;
use tracing::{debug, warn};

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Returns the most recent USD observation for `asset` at or before
    /// `at_block`. Never interpolates: callers get the last known
    /// price, not a synthesized one.
    async fn price_at(&self, asset: &AssetId, at_block: BlockNumber) -> Result<OraclePrice, DomainError>;
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub asset: AssetId,
    pub feed_url: String,
    pub scale: u32,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct FeedObservation {
    block: BlockNumber,
    price: String,
}

/// An HTTP-polled feed, per-asset, keeping an append-only in-memory
/// series of observations so `price_at` is a pure lookup rather than a
/// network call on the hot path.
pub struct HttpPriceOracle {
    feeds: HashMap<AssetId, FeedConfig>,
    client: reqwest::Client,
    series: RwLock<HashMap<AssetId, BTreeMap<BlockNumber, OraclePrice>>>,
}

impl HttpPriceOracle {
    pub fn new(feeds: Vec<FeedConfig>) -> Self {
        let feeds = feeds.into_iter().map(|f| (f.asset.clone(), f)).collect();
        Self {
            feeds,
            client: reqwest::Client::new(),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Polls every configured feed and merges newly seen observations
    /// into the in-memory series. Intended to be called on a timer
    /// ahead of each tick, driven by the scheduler.
    pub async fn refresh(&self) -> Result<(), DomainError> {
        for feed in self.feeds.values() {
            let observations: Vec<FeedObservation> = self
                .client
                .get(&feed.feed_url)
                .send()
                .await
                .map_err(|e| OracleError::Transport(e.to_string()))?
                .json()
                .await
                .map_err(|e| OracleError::Transport(e.to_string()))?;

            let mut series = self.series.write().unwrap();
            let entry = series.entry(feed.asset.clone()).or_default();
            for obs in observations {
                let magnitude: BigInt = obs.price.parse().map_err(|_| {
                    OracleError::Transport(format!(
                        "feed for {} returned non-integer price '{}'",
                        feed.asset, obs.price
                    ))
                })?;
                entry.insert(
                    obs.block,
                    OraclePrice {
                        asset: feed.asset.clone(),
                        block: obs.block,
                        usd_price: droplets_core::amount::Amount::from_raw(magnitude, feed.scale),
                        source: feed.feed_url.clone(),
                    },
                );
            }
            debug!(asset = %feed.asset, count = entry.len(), "refreshed oracle feed");
        }
        Ok(())
    }

    /// Seeds the series directly, bypassing HTTP — used by tests and by
    /// `doctor`-style backfills.
    pub fn seed(&self, observation: OraclePrice) {
        self.series
            .write()
            .unwrap()
            .entry(observation.asset.clone())
            .or_default()
            .insert(observation.block, observation);
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn price_at(&self, asset: &AssetId, at_block: BlockNumber) -> Result<OraclePrice, DomainError> {
        if !self.feeds.contains_key(asset) {
            return Err(OracleError::NoFeed(asset.clone()).into());
        }

        let series = self.series.read().unwrap();
        let Some(observations) = series.get(asset) else {
            return Err(OracleError::Unavailable {
                asset: asset.clone(),
                block: at_block,
            }
            .into());
        };

        match observations.range(..=at_block).next_back() {
            Some((_, price)) => Ok(price.clone()),
            None => {
                warn!(%asset, at_block, "no oracle observation at or before requested block");
                Err(OracleError::Unavailable {
                    asset: asset.clone(),
                    block: at_block,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droplets_core::amount::Amount;

    fn oracle_with_xeth_feed() -> HttpPriceOracle {
        HttpPriceOracle::new(vec![FeedConfig {
            asset: AssetId::from("xETH"),
            feed_url: "https://example.invalid/xeth".to_string(),
            scale: 8,
        }])
    }

    fn price(asset: &AssetId, block: BlockNumber, magnitude: i64) -> OraclePrice {
        OraclePrice {
            asset: asset.clone(),
            block,
            usd_price: Amount::from_raw(magnitude, 8),
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn unconfigured_asset_is_rejected_before_any_lookup() {
        let oracle = oracle_with_xeth_feed();
        let err = oracle.price_at(&AssetId::from("xBTC"), 100).await.unwrap_err();
        assert!(matches!(err, DomainError::Oracle(OracleError::NoFeed(_))));
    }

    #[tokio::test]
    async fn no_observation_yet_is_unavailable_not_a_guess() {
        let oracle = oracle_with_xeth_feed();
        let err = oracle.price_at(&AssetId::from("xETH"), 100).await.unwrap_err();
        assert!(matches!(err, DomainError::Oracle(OracleError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn returns_the_latest_observation_at_or_before_the_block_never_interpolated() {
        let oracle = oracle_with_xeth_feed();
        let asset = AssetId::from("xETH");
        oracle.seed(price(&asset, 100, 2_000_00000000));
        oracle.seed(price(&asset, 200, 2_100_00000000));

        let exact = oracle.price_at(&asset, 200).await.unwrap();
        assert_eq!(exact.block, 200);

        let between = oracle.price_at(&asset, 150).await.unwrap();
        assert_eq!(between.block, 100);
        assert_eq!(between.usd_price, Amount::from_raw(2_000_00000000i64, 8));

        let before_any = oracle.price_at(&asset, 50).await.unwrap_err();
        assert!(matches!(before_any, DomainError::Oracle(OracleError::Unavailable { .. })));

        let after_all = oracle.price_at(&asset, 1_000).await.unwrap();
        assert_eq!(after_all.block, 200);
    }
}
