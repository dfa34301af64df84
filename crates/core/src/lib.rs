//! Traits and types common to all `droplets` crates.
//!
//! Glossary:
//!  - `tick`: the canonical accrual boundary (see [`Tick`]); not
//!    necessarily aligned with any individual vault's internal round.
//!  - `round`: a vault's own internal accounting epoch, bounded by
//!    `RoundRolled` emissions. Tracked separately from ticks.

pub mod amount;
pub mod config;
pub mod entity;
pub mod error;
pub mod ids;
pub mod model;

pub use amount::*;
pub use entity::*;
pub use error::*;
pub use ids::*;
pub use model::*;

/// Composition root: every subsystem receives the services it needs by
/// reference to a value implementing this trait, rather than reaching
/// for ambient singletons.
pub trait Domain: Send + Sync + Clone + 'static {
    type ChainClient: Send + Sync;
    type Oracle: Send + Sync;
    type Storage: Send + Sync;

    fn config(&self) -> &config::Config;
    fn chain_client(&self) -> &Self::ChainClient;
    fn oracle(&self) -> &Self::Oracle;
    fn storage(&self) -> &Self::Storage;
}
