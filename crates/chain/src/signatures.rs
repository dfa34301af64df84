//! Known event topic0 signatures, computed at startup rather than
//! hand-copied as hex literals, so a typo in a signature string is a
//! compile-time-adjacent mistake instead of a silent hash mismatch.

use alloy::primitives::{keccak256, B256};

#[derive(Debug, Clone, Copy)]
pub struct EventSignatures {
    /// `Transfer(address,address,uint256)` — standard ERC-20.
    pub transfer: B256,
    /// `Deposit(address,address,uint256,uint256)` — ERC-4626.
    pub deposit: B256,
    /// `Withdraw(address,address,address,uint256,uint256)` — ERC-4626.
    pub withdraw: B256,
    /// `Staked(address,uint256)` — emitted by vault contracts that
    /// don't route staking through plain ERC-20 mint semantics.
    pub staked: B256,
    /// `Unstaked(address,uint256)`.
    pub unstaked: B256,
    /// `SendToChain(uint16,bytes32,uint256)` — LayerZero OFT bridge-out.
    pub bridge_out: B256,
    /// `ReceiveFromChain(uint16,bytes32,uint256)` — LayerZero OFT
    /// bridge-in.
    pub bridge_in: B256,
}

impl Default for EventSignatures {
    fn default() -> Self {
        Self {
            transfer: keccak256(b"Transfer(address,address,uint256)"),
            deposit: keccak256(b"Deposit(address,address,uint256,uint256)"),
            withdraw: keccak256(b"Withdraw(address,address,address,uint256,uint256)"),
            staked: keccak256(b"Staked(address,uint256)"),
            unstaked: keccak256(b"Unstaked(address,uint256)"),
            bridge_out: keccak256(b"SendToChain(uint16,bytes32,uint256)"),
            bridge_in: keccak256(b"ReceiveFromChain(uint16,bytes32,uint256)"),
        }
    }
}
