//! Test fixtures: synthetic addresses, a scriptable oracle, and an
//! in-memory storage backend so the accrual pipeline's tests never
//! need live infrastructure.

pub mod addresses;
pub mod fake_oracle;
pub mod memory_storage;

pub use fake_oracle::FakeOracle;
pub use memory_storage::MemoryStorage;
