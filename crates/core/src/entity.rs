//! Generic entity/delta framework: every mutable aggregate in this system
//! (a `ChainShareBalance`, an `IntegrationPosition`) is an [`Entity`],
//! and every append-only fact that mutates one (a `ShareEvent`, an
//! `IntegrationEvent`) is an [`EntityDelta`] that knows how to `apply`
//! and `undo` itself. Balance maintenance is nothing more than folding
//! a delta stream through `apply`, in `(block, log_index)` order;
//! reorg handling is folding the same stream through `undo` in
//! reverse.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Namespace = &'static str;

/// A namespaced key identifying one instance of an [`Entity`] — e.g.
/// `("chain_share_balance", address‖chain‖asset)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NsKey(pub Namespace, pub Vec<u8>);

impl NsKey {
    pub fn new(ns: Namespace, key: impl Into<Vec<u8>>) -> Self {
        Self(ns, key.into())
    }
}

impl fmt::Display for NsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, hex::encode(&self.1))
    }
}

/// A mutable aggregate whose only writer is the fold of an
/// [`EntityDelta`] stream (never written to directly).
pub trait Entity: Sized + Send + Sync + Clone {
    const NS: Namespace;
}

/// An immutable, append-only fact that mutates exactly one [`Entity`].
///
/// Implementors must be able to reconstruct any state needed for `undo`
/// from their own fields plus the entity's state *before* `apply` is
/// first called, supporting rollback without a separate undo-log.
pub trait EntityDelta: fmt::Debug + Clone + Send + Sync {
    type Entity: Entity;

    fn key(&self) -> Cow<'_, NsKey>;

    /// Applies this delta to `entity` (`None` means "did not exist
    /// yet"). Implementations must tolerate being asked to create the
    /// entity on first application.
    fn apply(&self, entity: &mut Option<Self::Entity>);

    /// Undoes a previously applied delta, used by reorg rewind and
    /// rollback replay.
    fn undo(&self, entity: &mut Option<Self::Entity>);
}

/// Applies an ordered batch of deltas that all target the same entity,
/// in order. Balance mutation always goes through this: deltas must
/// already be sorted by `(block, log_index)` by the caller.
pub fn fold_deltas<D: EntityDelta>(entity: &mut Option<D::Entity>, deltas: &[D]) {
    for delta in deltas {
        delta.apply(entity);
    }
}

/// Undoes an ordered batch of deltas in reverse order. Used to rewind
/// an entity when a reorg invalidates a window of already-applied
/// events.
pub fn unfold_deltas<D: EntityDelta>(entity: &mut Option<D::Entity>, deltas: &[D]) {
    for delta in deltas.iter().rev() {
        delta.undo(entity);
    }
}
