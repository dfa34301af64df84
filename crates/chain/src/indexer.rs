//! Drives the vault event indexer and integration indexer over a
//! block range: pulls raw logs through the chain client pool,
//! classifies them, and returns them ordered by `(block, log_index)`
//! — the order the balance engine requires for deterministic folding.

use droplets_core::error::DomainError;
use droplets_core::model::VaultContract;
use droplets_rpc::ChainClient;

use crate::events::{classify_log, ShareEvent};
use crate::signatures::EventSignatures;

/// Fetches and classifies every vault-token log for `vault` over
/// `[from_block, to_block]`, returning events sorted by
/// `(block, log_index)`.
pub async fn index_vault_range(
    client: &dyn ChainClient,
    vault: &VaultContract,
    sigs: &EventSignatures,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<ShareEvent>, DomainError> {
    let raw_logs = client
        .get_logs(vault.chain, vault.address, from_block, to_block)
        .await?;

    let mut events: Vec<ShareEvent> = raw_logs
        .iter()
        .flat_map(|log| classify_log(log, vault, sigs))
        .collect();

    events.sort_by_key(|e| (e.block, e.key.log_index));
    Ok(events)
}
