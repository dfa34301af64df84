//! Query surface: read-only HTTP JSON API over the materialized
//! snapshot/leaderboard/balance/event tables.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{ApiState, SharedState};
