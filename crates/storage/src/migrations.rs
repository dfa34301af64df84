//! Schema migrations: a small hand-rolled runner (no external
//! migration framework in the dependency graph) that tracks applied
//! migrations in a `_droplets_migrations` table and applies the rest
//! in order.
//!
//! `Amount`/`BigInt` values are stored as base-10 `TEXT` (magnitude)
//! plus a separate `scale INT` column rather than `NUMERIC`, since our
//! arithmetic already guarantees correct rounding before a value ever
//! reaches storage — `NUMERIC` would just be a second, redundant
//! decimal representation to keep in sync.

use tokio_postgres::Client;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_share_events",
        sql: r#"
            CREATE TABLE IF NOT EXISTS share_events (
                chain_id BIGINT NOT NULL,
                tx_hash BYTEA NOT NULL,
                log_index INT NOT NULL,
                address BYTEA NOT NULL,
                asset TEXT NOT NULL,
                kind TEXT NOT NULL,
                shares_delta_magnitude TEXT NOT NULL,
                scale INT NOT NULL,
                block_number BIGINT NOT NULL,
                PRIMARY KEY (chain_id, tx_hash, log_index)
            );
            CREATE INDEX IF NOT EXISTS share_events_chain_block
                ON share_events (chain_id, block_number);
            CREATE INDEX IF NOT EXISTS share_events_address
                ON share_events (address);
        "#,
    },
    Migration {
        name: "0002_integration_events",
        sql: r#"
            CREATE TABLE IF NOT EXISTS integration_events (
                chain_id BIGINT NOT NULL,
                tx_hash BYTEA NOT NULL,
                log_index INT NOT NULL,
                address BYTEA NOT NULL,
                protocol_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                event_kind TEXT NOT NULL,
                underlying_delta_magnitude TEXT NOT NULL,
                resync_to_magnitude TEXT,
                scale INT NOT NULL,
                block_number BIGINT NOT NULL,
                PRIMARY KEY (chain_id, tx_hash, log_index)
            );
            CREATE INDEX IF NOT EXISTS integration_events_address
                ON integration_events (address);
        "#,
    },
    Migration {
        name: "0003_balances",
        sql: r#"
            CREATE TABLE IF NOT EXISTS chain_share_balances (
                address BYTEA NOT NULL,
                chain_id BIGINT NOT NULL,
                asset TEXT NOT NULL,
                shares_magnitude TEXT NOT NULL,
                scale INT NOT NULL,
                last_event_tx_hash BYTEA,
                last_event_log_index INT,
                PRIMARY KEY (address, chain_id, asset)
            );
            CREATE TABLE IF NOT EXISTS integration_positions (
                address BYTEA NOT NULL,
                chain_id BIGINT NOT NULL,
                protocol_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                underlying_amount_magnitude TEXT NOT NULL,
                scale INT NOT NULL,
                PRIMARY KEY (address, chain_id, protocol_id)
            );
        "#,
    },
    Migration {
        name: "0004_cursors",
        sql: r#"
            CREATE TABLE IF NOT EXISTS cursors (
                chain_id BIGINT NOT NULL,
                contract_address BYTEA NOT NULL,
                last_processed_block BIGINT NOT NULL,
                PRIMARY KEY (chain_id, contract_address)
            );
        "#,
    },
    Migration {
        name: "0005_snapshots",
        sql: r#"
            CREATE TABLE IF NOT EXISTS user_snapshots (
                address BYTEA NOT NULL,
                tick BIGINT NOT NULL,
                payload JSONB NOT NULL,
                total_usd_magnitude TEXT NOT NULL,
                total_usd_scale INT NOT NULL,
                droplets_this_tick TEXT NOT NULL,
                droplets_cumulative TEXT NOT NULL,
                excluded BOOLEAN NOT NULL,
                PRIMARY KEY (address, tick)
            );
            CREATE INDEX IF NOT EXISTS user_snapshots_address_tick
                ON user_snapshots (address, tick DESC);

            CREATE TABLE IF NOT EXISTS protocol_snapshots (
                tick BIGINT PRIMARY KEY,
                payload JSONB NOT NULL,
                droplets_this_tick TEXT NOT NULL,
                droplets_cumulative TEXT NOT NULL,
                partial BOOLEAN NOT NULL
            );
        "#,
    },
    Migration {
        name: "0006_leaderboard",
        sql: r#"
            CREATE TABLE IF NOT EXISTS leaderboard (
                address BYTEA PRIMARY KEY,
                droplets_cumulative TEXT NOT NULL,
                last_tick BIGINT NOT NULL,
                ticks_participated BIGINT NOT NULL
            );
        "#,
    },
    Migration {
        name: "0007_oracle_prices",
        sql: r#"
            CREATE TABLE IF NOT EXISTS oracle_prices (
                asset TEXT NOT NULL,
                block_number BIGINT NOT NULL,
                usd_price_magnitude TEXT NOT NULL,
                scale INT NOT NULL,
                source TEXT NOT NULL,
                PRIMARY KEY (asset, block_number)
            );
        "#,
    },
    Migration {
        name: "0008_tick_locks",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tick_locks (
                tick BIGINT PRIMARY KEY,
                acquired_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
        "#,
    },
];

pub async fn run(client: &Client) -> Result<(), tokio_postgres::Error> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS _droplets_migrations (
                name TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );",
        )
        .await?;

    for migration in MIGRATIONS {
        let applied = client
            .query_opt(
                "SELECT 1 FROM _droplets_migrations WHERE name = $1",
                &[&migration.name],
            )
            .await?
            .is_some();
        if applied {
            continue;
        }
        tracing::info!(name = migration.name, "applying migration");
        client.batch_execute(migration.sql).await?;
        client
            .execute(
                "INSERT INTO _droplets_migrations (name) VALUES ($1)",
                &[&migration.name],
            )
            .await?;
    }
    Ok(())
}
