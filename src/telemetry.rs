//! Logging setup: an `EnvFilter` driven by `RUST_LOG`, defaulting to
//! the CLI's `--log-level` flag when unset.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
