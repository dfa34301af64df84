//! Vault event indexer, integration indexer, and balance engine.

pub mod balance;
pub mod events;
pub mod indexer;
pub mod integration;
pub mod reorg;
pub mod signatures;

pub use balance::{IntegrationPositionBook, ShareBalanceBook};
pub use events::{ChainShareBalance, ShareEvent, ShareEventKind};
pub use indexer::index_vault_range;
pub use integration::{IntegrationEvent, IntegrationEventKind, IntegrationPosition};
pub use signatures::EventSignatures;
