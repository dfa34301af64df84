use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable integer chain id (e.g. 1 = Ethereum mainnet, 42161 = Arbitrum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical asset symbol (xETH, xBTC, xUSD, xEUR, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A 20-byte EVM address, displayed lowercase-hex with `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let trimmed = value.strip_prefix("0x").unwrap_or(value);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(trimmed, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

pub type BlockNumber = u64;
pub type LogIndex = u32;
pub type RoundId = u64;

/// Natural key for a `ShareEvent`/`IntegrationEvent`: unique per
/// `(chain, tx_hash, log_index)`, so a log can never be double-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub chain: ChainId,
    pub tx_hash: TxHash,
    pub log_index: LogIndex,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.chain, self.tx_hash, self.log_index)
    }
}

/// The canonical accrual boundary. Monotonically increasing; not
/// necessarily aligned with any vault's internal round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TickId(pub u64);

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick-{}", self.0)
    }
}

impl TickId {
    pub fn previous(&self) -> Option<TickId> {
        self.0.checked_sub(1).map(TickId)
    }

    pub fn next(&self) -> TickId {
        TickId(self.0 + 1)
    }
}

/// A per-chain block reference used to pin a tick's inputs, indexed by
/// chain id since this system is multi-chain rather than single-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub chain: ChainId,
    pub number: BlockNumber,
    pub timestamp: i64,
}
