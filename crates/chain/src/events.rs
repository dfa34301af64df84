//! Vault event indexer: classifies raw vault-token contract logs into
//! [`ShareEvent`]s and folds them into [`ChainShareBalance`] via the
//! `Entity`/`EntityDelta` framework.

use std::borrow::Cow;

use droplets_core::amount::Amount;
use droplets_core::entity::{Entity, EntityDelta, NsKey};
use droplets_core::ids::{Address, AssetId, ChainId, EventKey};
use droplets_core::model::VaultContract;
use droplets_rpc::RawLog;
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};

use crate::signatures::EventSignatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareEventKind {
    Stake,
    Unstake,
    Redeem,
    TransferIn,
    TransferOut,
    BridgeIn,
    BridgeOut,
}

/// A single classified share-balance mutation. Carries a signed
/// `shares_delta` so `apply` is a plain addition regardless of `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEvent {
    pub key: EventKey,
    pub address: Address,
    pub chain: ChainId,
    pub asset: AssetId,
    pub kind: ShareEventKind,
    pub shares_delta: Amount,
    pub block: u64,
}

impl ShareEvent {
    fn entity_key(&self) -> NsKey {
        let mut bytes = Vec::with_capacity(20 + 8 + self.asset.0.len());
        bytes.extend_from_slice(&self.address.0);
        bytes.extend_from_slice(&self.chain.0.to_be_bytes());
        bytes.extend_from_slice(self.asset.0.as_bytes());
        NsKey::new(ChainShareBalance::NS, bytes)
    }
}

/// The accumulated on-chain share balance for one `(address, chain,
/// asset)` tuple, maintained purely by folding [`ShareEvent`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainShareBalance {
    pub address: Address,
    pub chain: ChainId,
    pub asset: AssetId,
    pub shares: Amount,
    pub last_event: Option<EventKey>,
    /// Set by the accrual engine when a `Redeem`/`Unstake` lands inside
    /// the tick currently being computed; a fresh entity always starts
    /// `false`.
    pub unstaked_this_tick: bool,
}

impl Entity for ChainShareBalance {
    const NS: &'static str = "chain_share_balance";
}

impl EntityDelta for ShareEvent {
    type Entity = ChainShareBalance;

    fn key(&self) -> Cow<'_, NsKey> {
        Cow::Owned(self.entity_key())
    }

    fn apply(&self, entity: &mut Option<Self::Entity>) {
        let balance = entity.get_or_insert_with(|| ChainShareBalance {
            address: self.address,
            chain: self.chain,
            asset: self.asset.clone(),
            shares: Amount::zero(self.shares_delta.scale()),
            last_event: None,
            unstaked_this_tick: false,
        });
        balance.shares = balance.shares.checked_add(&self.shares_delta);
        balance.last_event = Some(self.key);
        if matches!(self.kind, ShareEventKind::Unstake | ShareEventKind::Redeem) {
            balance.unstaked_this_tick = true;
        }
    }

    fn undo(&self, entity: &mut Option<Self::Entity>) {
        if let Some(balance) = entity {
            balance.shares = balance.shares.checked_sub(&self.shares_delta);
        }
    }
}

fn topics32(log: &RawLog, idx: usize) -> Option<[u8; 32]> {
    log.topics.get(idx).copied()
}

fn address_from_topic(topic: [u8; 32]) -> Address {
    let mut out = [0u8; 20];
    out.copy_from_slice(&topic[12..]);
    Address(out)
}

fn value_from_data(data: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, data)
}

/// Classifies one raw log against a vault's token contract, using the
/// following tie-break rules:
///
/// - A `Transfer` with `from == 0x0` is a mint: `Stake`.
/// - A `Transfer` with `to == 0x0` is a burn: `Unstake` (refined to
///   `Redeem` by the caller when a matching ERC-4626 `Withdraw` log
///   shares the same transaction).
/// - Any other `Transfer` is a plain peer-to-peer move: `TransferOut`
///   for the sender, `TransferIn` for the receiver — both returned,
///   since a single log mutates two balances.
/// - `SendToChain`/`ReceiveFromChain` are bridge legs and never paired
///   with a `Transfer` leg for the same shares (the OFT burns/mints on
///   each side; the `Transfer` for that mint/burn is suppressed by the
///   caller to avoid double counting).
pub fn classify_log(
    log: &RawLog,
    vault: &VaultContract,
    sigs: &EventSignatures,
) -> Vec<ShareEvent> {
    let Some(topic0) = topics32(log, 0) else {
        return Vec::new();
    };
    let scale = vault.pps_scale;
    let event_key = EventKey {
        chain: log.chain,
        tx_hash: droplets_core::ids::TxHash(log.tx_hash),
        log_index: log.log_index,
    };

    if topic0 == sigs.transfer.0 {
        let (Some(from_t), Some(to_t)) = (topics32(log, 1), topics32(log, 2)) else {
            return Vec::new();
        };
        let from = address_from_topic(from_t);
        let to = address_from_topic(to_t);
        let value = Amount::from_raw(value_from_data(&log.data), scale);

        if from.is_zero() {
            return vec![ShareEvent {
                key: event_key,
                address: to,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::Stake,
                shares_delta: value,
                block: log.block_number,
            }];
        }
        if to.is_zero() {
            let neg = Amount::zero(scale).checked_sub(&value);
            return vec![ShareEvent {
                key: event_key,
                address: from,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::Unstake,
                shares_delta: neg,
                block: log.block_number,
            }];
        }

        let neg = Amount::zero(scale).checked_sub(&value);
        return vec![
            ShareEvent {
                key: event_key,
                address: from,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::TransferOut,
                shares_delta: neg,
                block: log.block_number,
            },
            ShareEvent {
                key: event_key,
                address: to,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::TransferIn,
                shares_delta: value,
                block: log.block_number,
            },
        ];
    }

    if topic0 == sigs.withdraw.0 {
        // owner is topics[3]; assets amount is the first data word.
        if let Some(owner_t) = topics32(log, 3) {
            let owner = address_from_topic(owner_t);
            let assets = value_from_data(&log.data[..32.min(log.data.len())]);
            let neg = Amount::zero(scale).checked_sub(&Amount::from_raw(assets, scale));
            return vec![ShareEvent {
                key: event_key,
                address: owner,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::Redeem,
                shares_delta: neg,
                block: log.block_number,
            }];
        }
        return Vec::new();
    }

    if topic0 == sigs.bridge_out.0 {
        if let Some(sender_t) = topics32(log, 1) {
            let sender = address_from_topic(sender_t);
            let value = Amount::from_raw(value_from_data(&log.data), scale);
            let neg = Amount::zero(scale).checked_sub(&value);
            return vec![ShareEvent {
                key: event_key,
                address: sender,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::BridgeOut,
                shares_delta: neg,
                block: log.block_number,
            }];
        }
        return Vec::new();
    }

    if topic0 == sigs.bridge_in.0 {
        if let Some(recipient_t) = topics32(log, 1) {
            let recipient = address_from_topic(recipient_t);
            let value = Amount::from_raw(value_from_data(&log.data), scale);
            return vec![ShareEvent {
                key: event_key,
                address: recipient,
                chain: log.chain,
                asset: vault.asset.clone(),
                kind: ShareEventKind::BridgeIn,
                shares_delta: value,
                block: log.block_number,
            }];
        }
        return Vec::new();
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::EventSignatures;
    use droplets_testing::addresses::{address, chain, TEST_CHAIN_ETH};

    fn topic_from_address(a: Address) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&a.0);
        out
    }

    fn data_from_u64(v: u64) -> Vec<u8> {
        let mut out = vec![0u8; 32];
        out[24..].copy_from_slice(&v.to_be_bytes());
        out
    }

    fn vault() -> VaultContract {
        VaultContract {
            chain: chain(TEST_CHAIN_ETH),
            asset: AssetId::from("xETH"),
            address: address(1),
            deployment_block: 0,
            pps_scale: 18,
        }
    }

    fn base_log(topics: Vec<[u8; 32]>, data: Vec<u8>) -> RawLog {
        RawLog {
            chain: chain(TEST_CHAIN_ETH),
            address: address(1),
            block_number: 100,
            log_index: 0,
            tx_hash: [7u8; 32],
            topics,
            data,
        }
    }

    #[test]
    fn transfer_from_zero_is_stake() {
        let sigs = EventSignatures::default();
        let holder = address(2);
        let log = base_log(
            vec![
                sigs.transfer.0,
                topic_from_address(Address::ZERO),
                topic_from_address(holder),
            ],
            data_from_u64(1_000),
        );

        let events = classify_log(&log, &vault(), &sigs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ShareEventKind::Stake);
        assert_eq!(events[0].address, holder);
        assert!(!events[0].shares_delta.is_negative());
        assert_eq!(events[0].shares_delta.magnitude(), &BigInt::from(1_000));
    }

    #[test]
    fn transfer_to_zero_is_unstake() {
        let sigs = EventSignatures::default();
        let holder = address(2);
        let log = base_log(
            vec![
                sigs.transfer.0,
                topic_from_address(holder),
                topic_from_address(Address::ZERO),
            ],
            data_from_u64(500),
        );

        let events = classify_log(&log, &vault(), &sigs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ShareEventKind::Unstake);
        assert_eq!(events[0].address, holder);
        assert!(events[0].shares_delta.is_negative());
        assert_eq!(events[0].shares_delta.magnitude(), &BigInt::from(-500));
    }

    #[test]
    fn transfer_between_holders_is_a_pair() {
        let sigs = EventSignatures::default();
        let sender = address(2);
        let recipient = address(3);
        let log = base_log(
            vec![
                sigs.transfer.0,
                topic_from_address(sender),
                topic_from_address(recipient),
            ],
            data_from_u64(250),
        );

        let events = classify_log(&log, &vault(), &sigs);
        assert_eq!(events.len(), 2);

        let out_leg = events
            .iter()
            .find(|e| e.kind == ShareEventKind::TransferOut)
            .expect("transfer-out leg");
        assert_eq!(out_leg.address, sender);
        assert_eq!(out_leg.shares_delta.magnitude(), &BigInt::from(-250));

        let in_leg = events
            .iter()
            .find(|e| e.kind == ShareEventKind::TransferIn)
            .expect("transfer-in leg");
        assert_eq!(in_leg.address, recipient);
        assert_eq!(in_leg.shares_delta.magnitude(), &BigInt::from(250));
    }

    #[test]
    fn erc4626_withdraw_is_redeem() {
        let sigs = EventSignatures::default();
        let caller = address(4);
        let receiver = address(5);
        let owner = address(6);
        let log = base_log(
            vec![
                sigs.withdraw.0,
                topic_from_address(caller),
                topic_from_address(receiver),
                topic_from_address(owner),
            ],
            data_from_u64(777),
        );

        let events = classify_log(&log, &vault(), &sigs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ShareEventKind::Redeem);
        assert_eq!(events[0].address, owner);
        assert!(events[0].shares_delta.is_negative());
        assert_eq!(events[0].shares_delta.magnitude(), &BigInt::from(-777));
    }

    #[test]
    fn bridge_out_is_negative() {
        let sigs = EventSignatures::default();
        let sender = address(7);
        let log = base_log(
            vec![sigs.bridge_out.0, topic_from_address(sender)],
            data_from_u64(42),
        );

        let events = classify_log(&log, &vault(), &sigs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ShareEventKind::BridgeOut);
        assert_eq!(events[0].address, sender);
        assert!(events[0].shares_delta.is_negative());
        assert_eq!(events[0].shares_delta.magnitude(), &BigInt::from(-42));
    }

    #[test]
    fn bridge_in_is_positive() {
        let sigs = EventSignatures::default();
        let recipient = address(8);
        let log = base_log(
            vec![sigs.bridge_in.0, topic_from_address(recipient)],
            data_from_u64(42),
        );

        let events = classify_log(&log, &vault(), &sigs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ShareEventKind::BridgeIn);
        assert_eq!(events[0].address, recipient);
        assert!(!events[0].shares_delta.is_negative());
        assert_eq!(events[0].shares_delta.magnitude(), &BigInt::from(42));
    }

    #[test]
    fn unknown_topic0_yields_nothing() {
        let sigs = EventSignatures::default();
        let log = base_log(vec![[9u8; 32]], Vec::new());
        assert!(classify_log(&log, &vault(), &sigs).is_empty());
    }
}
