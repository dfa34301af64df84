//! Balance engine: maintains `ChainShareBalance` and
//! `IntegrationPosition` aggregates by folding classified event
//! streams. All the actual fold/unfold logic lives in
//! `droplets_core::entity`; this module is the thin, balance-specific
//! wrapper that keeps per-entity maps keyed the way storage expects.

use std::collections::HashMap;

use droplets_core::entity::{fold_deltas, unfold_deltas, NsKey};

use crate::events::{ChainShareBalance, ShareEvent};
use crate::integration::{IntegrationEvent, IntegrationPosition};

#[derive(Debug, Default)]
pub struct ShareBalanceBook {
    balances: HashMap<NsKey, Option<ChainShareBalance>>,
}

impl ShareBalanceBook {
    pub fn get(&self, key: &NsKey) -> Option<&ChainShareBalance> {
        self.balances.get(key).and_then(|v| v.as_ref())
    }

    /// Applies a batch of events, grouped by target entity, in the
    /// order given. Callers must pre-sort each entity's events by
    /// `(block, log_index)` — cross-entity ordering doesn't matter
    /// since each entity's state depends only on its own event stream.
    pub fn apply_grouped(&mut self, grouped: HashMap<NsKey, Vec<ShareEvent>>) {
        for (key, events) in grouped {
            let entry = self.balances.entry(key).or_insert(None);
            fold_deltas(entry, &events);
        }
    }

    /// Rewinds a batch of previously-applied events, used when a reorg
    /// invalidates a window of blocks.
    pub fn undo_grouped(&mut self, grouped: HashMap<NsKey, Vec<ShareEvent>>) {
        for (key, events) in grouped {
            if let Some(entry) = self.balances.get_mut(&key) {
                unfold_deltas(entry, &events);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainShareBalance> {
        self.balances.values().filter_map(|v| v.as_ref())
    }
}

#[derive(Debug, Default)]
pub struct IntegrationPositionBook {
    positions: HashMap<NsKey, Option<IntegrationPosition>>,
}

impl IntegrationPositionBook {
    pub fn get(&self, key: &NsKey) -> Option<&IntegrationPosition> {
        self.positions.get(key).and_then(|v| v.as_ref())
    }

    pub fn apply_grouped(&mut self, grouped: HashMap<NsKey, Vec<IntegrationEvent>>) {
        for (key, events) in grouped {
            let entry = self.positions.entry(key).or_insert(None);
            fold_deltas(entry, &events);
        }
    }

    pub fn undo_grouped(&mut self, grouped: HashMap<NsKey, Vec<IntegrationEvent>>) {
        for (key, events) in grouped {
            if let Some(entry) = self.positions.get_mut(&key) {
                unfold_deltas(entry, &events);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntegrationPosition> {
        self.positions.values().filter_map(|v| v.as_ref())
    }
}

/// Groups an ordered event slice by the entity it targets, preserving
/// relative order within each group — the shape `ShareBalanceBook`'s
/// `apply_grouped` expects.
pub fn group_by_entity<D: droplets_core::entity::EntityDelta + Clone>(
    events: &[D],
) -> HashMap<NsKey, Vec<D>> {
    let mut grouped: HashMap<NsKey, Vec<D>> = HashMap::new();
    for event in events {
        grouped.entry(event.key().into_owned()).or_default().push(event.clone());
    }
    grouped
}
