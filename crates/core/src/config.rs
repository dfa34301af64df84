//! Configuration: plain `serde` structs deserialized by the `config`
//! crate from a layered TOML-plus-environment-overrides source,
//! validated once at startup rather than trusted blindly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{AssetId, ChainId};
use crate::model::IntegrationKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: ChainId,
    pub name: String,
    pub rpc_endpoints: Vec<String>,
    /// Blocks to wait behind tip before a block is considered final
    /// enough to fold into balances.
    pub confirmations: u64,
    #[serde(default = "default_log_chunk")]
    pub max_log_chunk: u64,
}

fn default_log_chunk() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub chain: ChainId,
    pub asset: AssetId,
    pub address: String,
    pub deployment_block: u64,
    pub pps_scale: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: AssetId,
    pub oracle_feed: String,
    pub scale: u32,
    pub vaults: Vec<VaultConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub id: String,
    pub kind: IntegrationKind,
    pub chain: ChainId,
    pub contract_address: String,
    pub underlying_asset: AssetId,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedAddressConfig {
    pub address: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Seconds between accrual ticks.
    pub interval_seconds: i64,
    /// Genesis tick boundary, unix seconds.
    pub genesis_unix: i64,
    /// Droplets awarded per USD-second at rate 1.0.
    pub droplets_per_usd_tick: String,
    /// How long a tick may wait for a lagging chain before being
    /// marked partial.
    #[serde(default = "default_grace_seconds")]
    pub grace_window_seconds: i64,
}

fn default_grace_seconds() -> i64 {
    900
}

impl TickConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(0) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_max_consecutive_errors() -> u32 {
    10
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
    #[serde(default)]
    pub excluded_addresses: Vec<ExcludedAddressConfig>,
    pub tick: TickConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Cross-field validation pass: catches configuration mistakes a
    /// plain deserialize can't, before any chain client or accrual
    /// run starts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen_chains = std::collections::HashSet::new();
        for chain in &self.chains {
            if !seen_chains.insert(chain.id) {
                return Err(ValidationError::DuplicateChain(chain.id));
            }
        }

        let mut seen_assets = std::collections::HashSet::new();
        for asset in &self.assets {
            if !seen_assets.insert(asset.id.clone()) {
                return Err(ValidationError::DuplicateAsset(asset.id.clone()));
            }
            for vault in &asset.vaults {
                if !seen_chains.contains(&vault.chain) {
                    return Err(ValidationError::UnknownVaultContract(
                        vault.chain,
                        asset.id.clone(),
                    ));
                }
            }
        }

        for integration in &self.integrations {
            if !seen_assets.contains(&integration.underlying_asset) {
                return Err(ValidationError::UnknownUnderlyingAsset(
                    integration.id.clone(),
                    integration.underlying_asset.clone(),
                ));
            }
        }

        if self.tick.interval_seconds <= 0 {
            return Err(ValidationError::NonPositiveTickInterval(
                self.tick.interval_seconds,
            ));
        }

        Ok(())
    }
}
