//! Error taxonomy: each failure domain gets its own `thiserror` enum,
//! and [`DomainError`] wraps all of them behind one `From`-convertible
//! top type so callers at the edges (the scheduler, the HTTP API) can
//! match on a single type.

use crate::ids::{Address, AssetId, ChainId, TickId};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate chain id {0}")]
    DuplicateChain(ChainId),
    #[error("duplicate asset id {0}")]
    DuplicateAsset(AssetId),
    #[error("vault contract for ({0}, {1}) is not configured")]
    UnknownVaultContract(ChainId, AssetId),
    #[error("integration protocol '{0}' references unknown underlying asset {1}")]
    UnknownUnderlyingAsset(String, AssetId),
    #[error("tick interval must be positive, got {0}s")]
    NonPositiveTickInterval(i64),
    #[error("config field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NotFoundError {
    #[error("address {0} has no recorded activity")]
    Address(Address),
    #[error("tick {0} has not been computed yet")]
    Tick(TickId),
    #[error("asset {0} is not configured")]
    Asset(AssetId),
    #[error("no current round for asset {0} on chain {1}")]
    CurrentRound(AssetId, ChainId),
}

/// Retryable per-chain RPC failures: timeouts, rate limits,
/// range-too-large. The chain client pool retries these internally
/// before ever surfacing one.
#[derive(Debug, thiserror::Error)]
pub enum ChainTransientError {
    #[error("chain {chain} endpoint timed out: {detail}")]
    Timeout { chain: ChainId, detail: String },
    #[error("chain {chain} endpoint rate-limited us: {detail}")]
    RateLimited { chain: ChainId, detail: String },
    #[error("chain {chain} rejected block range as too large: {detail}")]
    RangeTooLarge { chain: ChainId, detail: String },
    #[error("chain {chain} endpoint returned malformed response: {detail}")]
    MalformedResponse { chain: ChainId, detail: String },
}

/// Raised once a chain's consecutive transient-error budget
/// (`rpc.max_consecutive_errors`) is exhausted.
#[derive(Debug, thiserror::Error)]
#[error("chain {chain} unavailable after {attempts} consecutive errors: {last}")]
pub struct ChainFatalError {
    pub chain: ChainId,
    pub attempts: u32,
    pub last: ChainTransientError,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("no price feed configured for asset {0}")]
    NoFeed(AssetId),
    #[error("oracle has no observation for {asset} at or before block {block}")]
    Unavailable { asset: AssetId, block: u64 },
    #[error("oracle endpoint error: {0}")]
    Transport(String),
}

/// Raised by the integration indexer when a position cannot be
/// reconciled against its backing vault balance without risking
/// double-counting.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationInconsistencyError {
    #[error("integration '{protocol_id}' position at {address} exceeds the underlying vault balance it claims to represent")]
    OverAttributed { protocol_id: String, address: Address },
    #[error("integration '{protocol_id}' reports a position with no matching mint/deposit event at {address}")]
    UnbackedPosition { protocol_id: String, address: Address },
}

/// Raised when a previously-processed block range is invalidated by a
/// chain reorg.
#[derive(Debug, thiserror::Error)]
#[error("chain {chain} reorged: common ancestor at block {common_ancestor}, {invalidated} blocks invalidated")]
pub struct ReorgDetectedError {
    pub chain: ChainId,
    pub common_ancestor: u64,
    pub invalidated: u64,
}

/// Raised when a tick computation is attempted while another is
/// already holding the single-tick lock.
#[derive(Debug, thiserror::Error)]
#[error("tick {0} is already being computed by another scheduler instance")]
pub struct SchedulerLockHeldError(pub TickId);

/// Raised when replaying the same inputs through the accrual engine
/// produces a different result than a previously committed snapshot —
/// every tick must be a pure function of its frozen inputs.
#[derive(Debug, thiserror::Error)]
#[error("tick {tick} is non-deterministic: recomputing produced a different result than the committed snapshot ({detail})")]
pub struct DeterminismViolationError {
    pub tick: TickId,
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    ChainTransient(#[from] ChainTransientError),
    #[error(transparent)]
    ChainFatal(#[from] ChainFatalError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    IntegrationInconsistency(#[from] IntegrationInconsistencyError),
    #[error(transparent)]
    ReorgDetected(#[from] ReorgDetectedError),
    #[error(transparent)]
    SchedulerLockHeld(#[from] SchedulerLockHeldError),
    #[error(transparent)]
    DeterminismViolation(#[from] DeterminismViolationError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl DomainError {
    /// HTTP status classification used by the read API's error mapping.
    pub fn status_class(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "bad_request",
            DomainError::NotFound(_) => "not_found",
            DomainError::ChainTransient(_) | DomainError::ChainFatal(_) | DomainError::Oracle(_) => {
                "upstream_unavailable"
            }
            DomainError::IntegrationInconsistency(_) | DomainError::DeterminismViolation(_) => {
                "data_inconsistent"
            }
            DomainError::ReorgDetected(_) => "retry",
            DomainError::SchedulerLockHeld(_) => "conflict",
            DomainError::Storage(_) | DomainError::Internal(_) => "internal",
        }
    }
}
