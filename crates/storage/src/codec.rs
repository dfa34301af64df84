//! Conversions between `droplets_core` value types and the plain
//! `TEXT`/`BYTEA`/`BIGINT` columns used to store them (see
//! `migrations.rs` for why amounts are base-10 text rather than
//! `NUMERIC`).

use droplets_core::amount::Amount;
use droplets_core::ids::{Address, ChainId, TxHash};
use num_bigint::BigInt;

pub fn amount_to_parts(amount: &Amount) -> (String, i32) {
    (amount.magnitude().to_string(), amount.scale() as i32)
}

pub fn amount_from_parts(magnitude: &str, scale: i32) -> Amount {
    let magnitude: BigInt = magnitude.parse().expect("stored amount magnitude is valid base-10");
    Amount::from_raw(magnitude, scale as u32)
}

pub fn bigint_to_text(value: &BigInt) -> String {
    value.to_string()
}

pub fn bigint_from_text(value: &str) -> BigInt {
    value.parse().expect("stored bigint is valid base-10")
}

pub fn address_to_bytes(address: Address) -> Vec<u8> {
    address.0.to_vec()
}

pub fn address_from_bytes(bytes: &[u8]) -> Address {
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    Address(out)
}

pub fn tx_hash_to_bytes(hash: TxHash) -> Vec<u8> {
    hash.0.to_vec()
}

pub fn tx_hash_from_bytes(bytes: &[u8]) -> TxHash {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    TxHash(out)
}

pub fn chain_id(chain: ChainId) -> i64 {
    chain.0 as i64
}
