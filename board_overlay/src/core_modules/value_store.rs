// THEORY:
// The value store owns the per-cell "tracked values" shown in each cell's
// bottom-right corner. Values are produced elsewhere (a real tracker, or the
// built-in `ShuffleSimulator`) and arrive as whole arrays; the store's only
// jobs are to publish them atomically and to keep a highlighted cell findable.
//
// Key architectural principles:
// 1.  **Snapshots, not buffers**: the current mapping is an immutable
//     `Arc<ValueMapping>`. `replace` builds a new mapping and swaps the `Arc`,
//     so a renderer holding the previous snapshot keeps a complete, consistent
//     view while the swap happens.
// 2.  **Identity is not position**: a cell's identity is the value it carries,
//     not the slot it currently sits in. Every mapping precomputes the reverse
//     lookup (identity → slot), so after a reshuffle the highlighted identity
//     is re-located instead of staying glued to its old slot.
// 3.  **No timing**: the store never decides when values change. The
//     scheduler's value-update activity calls `replace` on its own interval.
//
// Values are only assumed unique as far as highlighting needs: if the source
// produces duplicates, an identity resolves to its first slot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub type CellValue = i64;

/// A cell's stable identity, independent of its current slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIdentity(pub CellValue);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cell identity {0:?} is not in the current mapping")]
pub struct IdentityNotFound(pub CellIdentity);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueStoreError {
    #[error("value array has {actual} entries, the grid has {expected} cells")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Which cell, if any, is highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HighlightPolicy {
    #[default]
    None,
    /// A fixed identity chosen by the caller.
    Identity { value: CellValue },
    /// Whatever identity holds the largest value when the session starts.
    HighestValue,
}

impl HighlightPolicy {
    /// The identity to follow, given the session's first mapping.
    pub fn resolve(&self, initial: &[CellValue]) -> Option<CellIdentity> {
        match *self {
            HighlightPolicy::None => None,
            HighlightPolicy::Identity { value } => Some(CellIdentity(value)),
            HighlightPolicy::HighestValue => initial.iter().max().copied().map(CellIdentity),
        }
    }
}

/// An immutable, row-major array of cell values plus its reverse lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMapping {
    values: Vec<CellValue>,
    slots: HashMap<CellValue, usize>,
    highlighted: Option<CellIdentity>,
}

impl ValueMapping {
    pub fn new(values: Vec<CellValue>) -> Self {
        let mut slots = HashMap::with_capacity(values.len());
        for (slot, value) in values.iter().enumerate() {
            slots.entry(*value).or_insert(slot);
        }
        Self {
            values,
            slots,
            highlighted: None,
        }
    }

    fn with_highlight(mut self, highlighted: Option<CellIdentity>) -> Self {
        self.highlighted = highlighted;
        self
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn value_at(&self, slot: usize) -> Option<CellValue> {
        self.values.get(slot).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The slot currently holding `identity`.
    pub fn resolve_position(&self, identity: CellIdentity) -> Result<usize, IdentityNotFound> {
        self.slots
            .get(&identity.0)
            .copied()
            .ok_or(IdentityNotFound(identity))
    }

    pub fn highlighted(&self) -> Option<CellIdentity> {
        self.highlighted
    }

    /// Slot of the highlighted identity, if one is set and present.
    pub fn highlighted_slot(&self) -> Option<usize> {
        self.highlighted.and_then(|id| self.resolve_position(id).ok())
    }
}

/// `1..=n` in order.
pub fn sequential_values(n: usize) -> Vec<CellValue> {
    (1..=n as CellValue).collect()
}

/// In-place Fisher–Yates: from the last index down to 1, swap with a
/// uniformly random index in `[0, i]`.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// A uniformly random permutation of `1..=n`.
pub fn init_dynamic_mapping<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<CellValue> {
    let mut values = sequential_values(n);
    fisher_yates(&mut values, rng);
    values
}

/// Shared owner of the current `ValueMapping`.
#[derive(Debug)]
pub struct ValueStore {
    expected_len: usize,
    current: RwLock<Arc<ValueMapping>>,
}

impl ValueStore {
    pub fn new(initial: Vec<CellValue>, highlighted: Option<CellIdentity>) -> Self {
        Self {
            expected_len: initial.len(),
            current: RwLock::new(Arc::new(ValueMapping::new(initial).with_highlight(highlighted))),
        }
    }

    /// The latest published mapping.
    pub async fn read(&self) -> Arc<ValueMapping> {
        self.current.read().await.clone()
    }

    /// Publishes `values` as the new mapping in one swap. The highlighted
    /// identity carries over and is re-resolved against the new slots.
    pub async fn replace(&self, values: Vec<CellValue>) -> Result<(), ValueStoreError> {
        if values.len() != self.expected_len {
            return Err(ValueStoreError::LengthMismatch {
                expected: self.expected_len,
                actual: values.len(),
            });
        }
        // Building the lookup happens outside the lock.
        let fresh = ValueMapping::new(values);
        let mut current = self.current.write().await;
        let highlighted = current.highlighted;
        *current = Arc::new(fresh.with_highlight(highlighted));
        Ok(())
    }

    pub async fn set_highlight(&self, highlighted: Option<CellIdentity>) {
        let mut current = self.current.write().await;
        let next = ValueMapping::clone(&current).with_highlight(highlighted);
        *current = Arc::new(next);
    }

    pub async fn resolve_position(&self, identity: CellIdentity) -> Result<usize, IdentityNotFound> {
        self.read().await.resolve_position(identity)
    }
}

/// Produces a fresh value array for the value-update activity.
pub trait ValueSource: Send {
    fn produce_values(&mut self, rows: u32, cols: u32) -> Vec<CellValue>;
}

/// Keeps one array of `1..=rows·cols` and reshuffles it on every call.
pub struct ShuffleSimulator {
    rng: StdRng,
    values: Vec<CellValue>,
}

impl ShuffleSimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            values: Vec::new(),
        }
    }
}

impl Default for ShuffleSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueSource for ShuffleSimulator {
    fn produce_values(&mut self, rows: u32, cols: u32) -> Vec<CellValue> {
        let n = rows as usize * cols as usize;
        if self.values.len() != n {
            self.values = sequential_values(n);
        }
        fisher_yates(&mut self.values, &mut self.rng);
        self.values.clone()
    }
}
