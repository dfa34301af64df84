//! Reorg detection: before indexing a new range, the indexer confirms
//! the parent of its next block still matches what it last recorded.
//! A mismatch means a reorg happened at or before that point, and
//! everything from the common ancestor forward must be undone and
//! replayed.

use droplets_core::ids::{BlockNumber, ChainId};

#[derive(Debug, Clone, Copy)]
pub struct BlockHash {
    pub number: BlockNumber,
    pub hash: [u8; 32],
}

/// Given the locally recorded chain of block hashes (most recent last)
/// and the chain's current canonical hashes for the same range,
/// returns the highest block number at which the two agree. `None`
/// means every recorded block disagrees with the chain — indexing
/// should rewind all the way to the configured confirmation floor.
pub fn common_ancestor(recorded: &[BlockHash], canonical: &[BlockHash]) -> Option<BlockNumber> {
    let canonical_by_number: std::collections::HashMap<_, _> =
        canonical.iter().map(|b| (b.number, b.hash)).collect();

    recorded
        .iter()
        .rev()
        .find(|b| canonical_by_number.get(&b.number) == Some(&b.hash))
        .map(|b| b.number)
}

pub fn invalidated_count(common_ancestor: BlockNumber, recorded_tip: BlockNumber) -> u64 {
    recorded_tip.saturating_sub(common_ancestor)
}

pub fn to_reorg_error(
    chain: ChainId,
    common_ancestor: BlockNumber,
    recorded_tip: BlockNumber,
) -> droplets_core::error::ReorgDetectedError {
    droplets_core::error::ReorgDetectedError {
        chain,
        common_ancestor,
        invalidated: invalidated_count(common_ancestor, recorded_tip),
    }
}
