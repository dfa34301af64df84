//! CLI surface: `serve` runs the read API, `index` runs the
//! chain/integration indexers to catch balances up to tip, `tick`
//! computes any pending accrual ticks, `doctor` runs the
//! config-validation and connectivity checks operators run before
//! trusting a deployment.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use droplets_accrual::{AccrualEngine, PpsBook, Scheduler};
use droplets_api::ApiState;
use droplets_chain::{index_vault_range, EventSignatures};
use droplets_core::config::Config;
use droplets_core::ids::{Address, ChainId};
use droplets_oracle::HttpPriceOracle;
use droplets_rpc::{ChainClient, ChainPool};
use droplets_storage::PostgresStorage;

#[derive(Parser)]
#[command(name = "droplets", about = "Deterministic cross-chain vault-share accrual engine")]
pub struct Cli {
    #[arg(long, env = "DROPLETS_CONFIG", default_value = "droplets.toml")]
    pub config: String,

    #[arg(long, env = "DROPLETS_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Runs the read-only HTTP query surface.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
    },
    /// Catches every configured vault's indexer up to chain tip.
    Index,
    /// Computes every pending accrual tick.
    Tick,
    /// Validates configuration and probes every configured RPC
    /// endpoint and the database, without mutating any state.
    Doctor,
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("DROPLETS").separator("__"))
        .build()?;
    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl Cli {
    pub async fn run(&self) -> anyhow::Result<()> {
        let config = load_config(&self.config)?;

        match &self.command {
            Command::Serve { listen } => serve(config, *listen).await,
            Command::Index => index(config).await,
            Command::Tick => tick(config).await,
            Command::Doctor => doctor(config).await,
        }
    }
}

fn chain_pool(config: &Config) -> ChainPool {
    ChainPool::new(
        config
            .chains
            .iter()
            .map(|c| (c.id, c.rpc_endpoints.clone(), c.max_log_chunk)),
        config.rpc.clone(),
    )
}

async fn serve(config: Config, listen: SocketAddr) -> anyhow::Result<()> {
    let storage = Arc::new(PostgresStorage::connect(&config.storage).await?);
    let state = Arc::new(ApiState {
        snapshots: storage.clone(),
        leaderboard: storage.clone(),
        balances: storage.clone(),
        events: storage.clone(),
        oracle_feed: storage.clone(),
    });
    let app = droplets_api::router(state);
    tracing::info!(%listen, "starting query surface");
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(config: Config) -> anyhow::Result<()> {
    let storage = Arc::new(PostgresStorage::connect(&config.storage).await?);
    let pool = chain_pool(&config);
    let sigs = EventSignatures::default();

    for asset in &config.assets {
        for vault in &asset.vaults {
            let vault_contract = droplets_core::model::VaultContract {
                chain: vault.chain,
                asset: asset.id.clone(),
                address: Address::from_hex(&vault.address)?,
                deployment_block: vault.deployment_block,
                pps_scale: vault.pps_scale,
            };
            let from_block = droplets_storage::CursorStore::get(
                storage.as_ref(),
                vault.chain,
                vault_contract.address,
            )
            .await?
            .map(|c| c.last_processed_block + 1)
            .unwrap_or(vault.deployment_block);
            let tip = pool.get_block_number(vault.chain).await?;
            if from_block > tip {
                continue;
            }
            let events = index_vault_range(&pool, &vault_contract, &sigs, from_block, tip).await?;
            tracing::info!(chain = %vault.chain, asset = %asset.id, count = events.len(), "indexed vault range");
            droplets_storage::EventStore::append_share_events(storage.as_ref(), &events).await?;
            droplets_storage::CursorStore::set(
                storage.as_ref(),
                droplets_core::model::Cursor {
                    chain: vault.chain,
                    contract_address: vault_contract.address,
                    last_processed_block: tip,
                },
            )
            .await?;
        }
    }
    Ok(())
}

async fn tick(config: Config) -> anyhow::Result<()> {
    let storage = Arc::new(PostgresStorage::connect(&config.storage).await?);
    let pool = chain_pool(&config);
    let oracle = Arc::new(HttpPriceOracle::new(
        config
            .assets
            .iter()
            .map(|a| droplets_oracle::FeedConfig {
                asset: a.id.clone(),
                feed_url: a.oracle_feed.clone(),
                scale: a.scale,
            })
            .collect(),
    ));
    oracle.refresh().await?;

    let pps = Arc::new(PpsBook::new());
    let engine = AccrualEngine::new(storage.clone(), oracle, pps, config.clone());
    let chains: Vec<ChainId> = config.chains.iter().map(|c| c.id).collect();
    let scheduler = Scheduler::new(storage.clone(), storage.clone(), config.tick.clone(), chains);

    let computed = scheduler.catch_up(&pool, &engine).await?;
    tracing::info!(count = computed.len(), "computed pending ticks");
    Ok(())
}

async fn doctor(config: Config) -> anyhow::Result<()> {
    tracing::info!("config parsed and validated OK");
    let pool = chain_pool(&config);
    for chain in &config.chains {
        match pool.get_block_number(chain.id).await {
            Ok(block) => tracing::info!(chain = %chain.id, block, "chain reachable"),
            Err(err) => tracing::warn!(chain = %chain.id, error = %err, "chain unreachable"),
        }
    }
    match PostgresStorage::connect(&config.storage).await {
        Ok(_) => tracing::info!("database reachable, migrations applied"),
        Err(err) => tracing::warn!(error = %err, "database unreachable"),
    }
    Ok(())
}
