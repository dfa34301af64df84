use std::sync::Arc;

use droplets_storage::{BalanceStore, EventStore, LeaderboardStore, OracleFeedStore, SnapshotStore};

/// Composition root for the HTTP surface: one trait object per
/// storage concern, so the API never depends on the concrete Postgres
/// type (mirrors the way `droplets_core::Domain` decouples the rest of
/// the pipeline from its backends).
pub struct ApiState {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub leaderboard: Arc<dyn LeaderboardStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub events: Arc<dyn EventStore>,
    pub oracle_feed: Arc<dyn OracleFeedStore>,
}

pub type SharedState = Arc<ApiState>;
