//! Snapshot/accrual engine and scheduler.

pub mod pps;
pub mod scheduler;
pub mod snapshot;

pub use pps::PpsBook;
pub use scheduler::Scheduler;
pub use snapshot::{AccrualEngine, BlockRefInfo, TickInputs};
