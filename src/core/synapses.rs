//! A `Synapse` models a single connection between a distal segment and a presynaptic cell.
//! Each synapse links exactly one segment to one cell that provides input.
//!
//! If the permanence is at or above the connected threshold, the synapse is considered "connected".
//! During learning, permanence is increased or decreased depending on whether the presynaptic cell
//! was active. Active synapses count toward the segment's overlap score.
//!
//! Segment and synapse records live in flat vecs inside the connections store, indexed by their
//! handle. A segment keeps the ordered list of synapse handles it owns, tombstones included,
//! plus a free list of tombstoned synapses that the next synapse creation reuses.
//!
//! The `ReceptorIndex` is the reverse direction: for every presynaptic cell, the synapses that
//! listen to it. Activity computation walks this index from the active cells, so it only touches
//! synapses that can actually contribute to an overlap.

use super::ids::{Cell, Segment, Synapse};
use fxhash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// A distal dendrite segment on a cell.
#[derive(Debug, Clone)]
pub struct SegmentData {
    /// The cell that owns this segment.
    pub(crate) cell: Cell,

    pub(crate) destroyed: bool,

    /// Iteration at which the segment was created or last found active.
    pub(crate) last_used_iteration: u64,

    /// All synapses allocated on this segment, tombstones included.
    pub(crate) synapses: Vec<Synapse>,

    /// Tombstoned synapses awaiting reuse, smallest index (first in storage order) first.
    pub(crate) destroyed_synapses: BTreeSet<Synapse>,

    /// Number of live synapses with permanence at or above the connected threshold.
    pub(crate) num_connected: usize,
}

impl SegmentData {
    pub(crate) fn new(cell: Cell, iteration: u64) -> Self {
        Self {
            cell,
            destroyed: false,
            last_used_iteration: iteration,
            synapses: Vec::new(),
            destroyed_synapses: BTreeSet::new(),
            num_connected: 0,
        }
    }

    #[inline]
    pub fn cell(&self) -> Cell {
        self.cell
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[inline]
    pub fn last_used_iteration(&self) -> u64 {
        self.last_used_iteration
    }

    /// All synapses on the segment, including destroyed ones.
    #[inline]
    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    #[inline]
    pub fn num_destroyed_synapses(&self) -> usize {
        self.destroyed_synapses.len()
    }

    #[inline]
    pub fn num_live_synapses(&self) -> usize {
        self.synapses.len() - self.destroyed_synapses.len()
    }

    #[inline]
    pub fn num_connected(&self) -> usize {
        self.num_connected
    }
}

/// A synapse connecting a segment with a presynaptic cell, holding a permanence value.
#[derive(Debug, Clone)]
pub struct SynapseData {
    /// The segment that owns this synapse.
    pub(crate) segment: Segment,

    /// The cell this synapse listens to. Not owned.
    pub(crate) presynaptic_cell: Cell,

    /// Represents the strength of the connection between the segment and the presynaptic cell.
    pub(crate) permanence: f64,

    pub(crate) destroyed: bool,
}

impl SynapseData {
    pub(crate) fn new(segment: Segment, presynaptic_cell: Cell) -> Self {
        Self {
            segment,
            presynaptic_cell,
            permanence: 0.0,
            destroyed: false,
        }
    }

    #[inline]
    pub fn segment(&self) -> Segment {
        self.segment
    }

    #[inline]
    pub fn presynaptic_cell(&self) -> Cell {
        self.presynaptic_cell
    }

    #[inline]
    pub fn permanence(&self) -> f64 {
        self.permanence
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Maps each presynaptic cell to every live synapse that targets it.
///
/// Derived from the synapse records and updated on every synapse creation and destruction.
/// A cell with no remaining synapses has no entry at all.
#[derive(Debug, Default, Clone)]
pub struct ReceptorIndex {
    entries: FxHashMap<Cell, FxHashSet<Synapse>>,
}

impl ReceptorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `synapse` under `cell`, creating the entry if absent.
    pub fn insert(&mut self, cell: Cell, synapse: Synapse) {
        let inserted = self.entries.entry(cell).or_default().insert(synapse);
        assert!(
            inserted,
            "{synapse} is already registered in the receptor index of {cell}"
        );
    }

    /// Unregisters `synapse` from `cell`, dropping the entry once it is empty.
    pub fn remove(&mut self, cell: Cell, synapse: Synapse) {
        let Some(entry) = self.entries.get_mut(&cell) else {
            panic!("{cell} has no receptor index entry while removing {synapse}");
        };
        assert!(
            entry.remove(&synapse),
            "{synapse} is missing from the receptor index of {cell}"
        );

        if entry.is_empty() {
            self.entries.remove(&cell);
        }
    }

    /// The synapses listening to `cell`, if any.
    #[inline]
    pub fn synapses_for(&self, cell: Cell) -> Option<&FxHashSet<Synapse>> {
        self.entries.get(&cell)
    }

    /// Number of presynaptic cells with at least one synapse.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A copy of the whole index with each entry sorted by synapse index.
    pub fn snapshot(&self) -> FxHashMap<Cell, Vec<Synapse>> {
        self.entries
            .iter()
            .map(|(&cell, synapses)| {
                let mut synapses: Vec<Synapse> = synapses.iter().copied().collect();
                synapses.sort_unstable();
                (cell, synapses)
            })
            .collect()
    }
}
