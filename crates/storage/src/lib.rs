//! Storage layer: trait seams plus a Postgres implementation.

pub mod codec;
pub mod migrations;
pub mod postgres;
pub mod traits;

pub use postgres::PostgresStorage;
pub use traits::{
    BalanceStore, CursorStore, EventStore, LeaderboardStore, OracleFeedStore, SnapshotStore, TickLock,
};
