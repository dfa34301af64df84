//! Deterministic synthetic address/chain generators for tests — no
//! randomness, so a failing property test reproduces exactly.

use droplets_core::ids::{Address, ChainId};

pub fn address(seed: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = seed;
    bytes[0] = 0xAA;
    Address(bytes)
}

pub fn chain(id: u64) -> ChainId {
    ChainId(id)
}

pub const TEST_CHAIN_ETH: u64 = 1;
pub const TEST_CHAIN_ARB: u64 = 42161;
