//! The `Connections` store holds the distal dendrite graph of a temporal memory.
//!
//! Structure:
//! - Columns and cells are fixed at construction. A cell is addressed by its flat index.
//! - Every cell owns a list of segments, every segment owns a list of synapses.
//! - Every synapse points at a presynaptic cell. The receptor index maps each presynaptic cell
//!   back to the synapses targeting it.
//!
//! All records live in flat vecs addressed by `Segment`/`Synapse` handles. A handle is assigned
//! once when the record is first allocated and never moves to another entity.
//!
//! Growth and eviction:
//! - Destroying a segment or synapse leaves a tombstone in its owner's free list.
//! - Creating a segment on a cell, or a synapse on a segment, reuses the owner's first tombstone
//!   before allocating a new handle. This keeps the handle space dense, which the activity
//!   computation relies on for array-indexed accumulation.
//! - A cell never holds more than `max_segments_per_cell` live segments. When full, the least
//!   recently used segment is destroyed first.
//! - A segment never holds more than `max_synapses_per_segment` live synapses. When full, the
//!   synapse with the smallest permanence is destroyed first.
//!
//! A segment destroyed together with its synapses drops them from its list entirely. Those
//! synapse handles stay destroyed for the rest of the process.

use super::activity::SegmentOverlap;
use super::arena::IdArena;
use super::column::{CellData, Column};
use super::ids::{Cell, Segment, Synapse};
use super::params::ConnectionsParams;
use super::synapses::{ReceptorIndex, SegmentData, SynapseData};
use crate::error::{ConnectionsError, Result};
use fxhash::FxHashMap;
use tracing::{debug, trace};

/// Tolerance used for permanence comparisons.
pub const EPSILON: f64 = 0.00001;

/// The distal dendrite graph of a temporal memory, plus the per-step state the learning
/// algorithm keeps next to it.
///
/// Single-threaded: operations run to completion and assume no concurrent mutation.
#[derive(Debug, Clone)]
pub struct Connections {
    pub(crate) params: ConnectionsParams,

    pub(crate) cells: Vec<CellData>,
    pub(crate) segments: Vec<SegmentData>,
    pub(crate) synapses: Vec<SynapseData>,

    pub(crate) segment_ids: IdArena,
    pub(crate) synapse_ids: IdArena,

    pub(crate) receptors: ReceptorIndex,

    /// Temporal memory iteration. Only advanced by `compute_activity` when recording.
    pub(crate) iteration: u64,

    // Learning state of the current time step.
    pub(crate) active_cells: Vec<Cell>,
    pub(crate) winner_cells: Vec<Cell>,
    pub(crate) active_segment_overlaps: Vec<SegmentOverlap>,
    pub(crate) matching_segment_overlaps: Vec<SegmentOverlap>,

    /// Cached view derived from `active_segment_overlaps`. `None` until requested after a clear.
    pub(crate) predictive_cells: Option<Vec<Cell>>,
}

impl Connections {
    /// Constructs the store for the configured columns and cells. No segments exist yet.
    pub fn new(params: ConnectionsParams) -> Result<Self> {
        params.validate()?;

        let num_cells = params.num_cells();

        Ok(Self {
            cells: vec![CellData::default(); num_cells],
            segments: Vec::new(),
            synapses: Vec::new(),
            segment_ids: IdArena::new(),
            synapse_ids: IdArena::new(),
            receptors: ReceptorIndex::new(),
            iteration: 0,
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            active_segment_overlaps: Vec::new(),
            matching_segment_overlaps: Vec::new(),
            predictive_cells: None,
            params,
        })
    }

    #[inline]
    pub fn params(&self) -> &ConnectionsParams {
        &self.params
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.params.num_columns
    }

    #[inline]
    pub fn cells_per_column(&self) -> usize {
        self.params.cells_per_column
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Current temporal memory iteration.
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// One past the highest segment index ever allocated.
    #[inline]
    pub fn next_segment_index(&self) -> usize {
        self.segment_ids.next_index()
    }

    /// One past the highest synapse index ever allocated.
    #[inline]
    pub fn next_synapse_index(&self) -> usize {
        self.synapse_ids.next_index()
    }

    // Argument validation. Every public operation checks its handles before mutating anything.

    pub(crate) fn check_cell(&self, cell: Cell) -> Result<()> {
        if cell.index() < self.cells.len() {
            Ok(())
        } else {
            Err(ConnectionsError::CellOutOfRange {
                cell: cell.index(),
                num_cells: self.cells.len(),
            })
        }
    }

    pub(crate) fn check_segment(&self, segment: Segment) -> Result<()> {
        if segment.index() < self.segments.len() {
            Ok(())
        } else {
            Err(ConnectionsError::SegmentOutOfRange {
                segment: segment.index(),
                next: self.segments.len(),
            })
        }
    }

    pub(crate) fn check_synapse(&self, synapse: Synapse) -> Result<()> {
        if synapse.index() < self.synapses.len() {
            Ok(())
        } else {
            Err(ConnectionsError::SynapseOutOfRange {
                synapse: synapse.index(),
                next: self.synapses.len(),
            })
        }
    }

    pub(crate) fn check_live_segment(&self, segment: Segment) -> Result<()> {
        self.check_segment(segment)?;
        if self.segments[segment.index()].destroyed {
            return Err(ConnectionsError::DestroyedSegment(segment.index()));
        }
        Ok(())
    }

    /// Rejects NaN permanences and permanence deltas.
    pub(crate) fn check_permanence(permanence: f64) -> Result<()> {
        if permanence.is_nan() {
            return Err(ConnectionsError::InvalidPermanence(permanence));
        }
        Ok(())
    }

    pub(crate) fn clamp_permanence(&self, permanence: f64) -> Result<f64> {
        Self::check_permanence(permanence)?;
        Ok(permanence.clamp(self.params.permanence_min, self.params.permanence_max))
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    /// Returns the column at `index`.
    pub fn column(&self, index: usize) -> Result<Column> {
        if index >= self.params.num_columns {
            return Err(ConnectionsError::ColumnOutOfRange {
                column: index,
                num_columns: self.params.num_columns,
            });
        }
        Ok(Column::new(index, self.params.cells_per_column))
    }

    /// Returns the index of the column owning `cell`.
    pub fn column_index_for_cell(&self, cell: Cell) -> Result<usize> {
        self.check_cell(cell)?;
        Ok(cell.index() / self.params.cells_per_column)
    }

    /// Returns the index of the column owning the cell that owns `segment`.
    pub fn column_index_for_segment(&self, segment: Segment) -> Result<usize> {
        self.check_segment(segment)?;
        Ok(self.segments[segment.index()].cell.index() / self.params.cells_per_column)
    }

    // ------------------------------------------------------------------
    // Segments
    // ------------------------------------------------------------------

    /// Returns a live segment on `cell`, reusing a destroyed one if the cell has any.
    ///
    /// If the cell already holds `max_segments_per_cell` live segments, the least recently used
    /// one is destroyed first. The returned segment is stamped with the current iteration.
    pub fn create_segment(&mut self, cell: Cell) -> Result<Segment> {
        self.check_cell(cell)?;

        while self.cells[cell.index()].num_live_segments() >= self.params.max_segments_per_cell {
            let Some(lru) = self.least_recently_used_segment(cell) else {
                panic!("{cell} is at segment capacity but has no live segment to evict");
            };

            debug!(
                %cell,
                segment = %lru,
                last_used = self.segments[lru.index()].last_used_iteration,
                "Evicting least recently used segment"
            );
            self.destroy_segment_unchecked(lru);
        }

        let cell_data = &mut self.cells[cell.index()];

        let segment = if let Some(reuse) = cell_data.destroyed_segments.pop_first() {
            let data = &mut self.segments[reuse.index()];
            assert!(
                data.destroyed && data.cell == cell,
                "Free list of {cell} holds {reuse}, which is not a destroyed segment of that cell"
            );

            data.destroyed = false;
            self.segment_ids.reactivate();
            trace!(%cell, segment = %reuse, "Reused destroyed segment");
            reuse
        } else {
            let segment = Segment::new(self.segment_ids.allocate());
            debug_assert_eq!(segment.index(), self.segments.len());

            self.segments.push(SegmentData::new(cell, self.iteration));
            cell_data.segments.push(segment);
            trace!(%cell, %segment, "Allocated segment");
            segment
        };

        self.segments[segment.index()].last_used_iteration = self.iteration;

        Ok(segment)
    }

    /// Destroys `segment` and all of its synapses. Destroying a destroyed segment is a no-op.
    pub fn destroy_segment(&mut self, segment: Segment) -> Result<()> {
        self.check_segment(segment)?;
        self.destroy_segment_unchecked(segment);
        Ok(())
    }

    pub(crate) fn destroy_segment_unchecked(&mut self, segment: Segment) {
        let data = &mut self.segments[segment.index()];

        if data.destroyed {
            return;
        }

        for &synapse in &data.synapses {
            let synapse_data = &mut self.synapses[synapse.index()];

            if !synapse_data.destroyed {
                self.receptors.remove(synapse_data.presynaptic_cell, synapse);
                synapse_data.destroyed = true;
                self.synapse_ids.release();
            }
        }

        debug!(%segment, cell = %data.cell, synapses = data.synapses.len(), "Destroyed segment");

        data.synapses.clear();
        data.destroyed_synapses.clear();
        data.num_connected = 0;
        data.destroyed = true;

        self.cells[data.cell.index()].destroyed_segments.insert(segment);
        self.segment_ids.release();
    }

    /// The live segment on `cell` with the smallest `last_used_iteration`. First found wins ties.
    fn least_recently_used_segment(&self, cell: Cell) -> Option<Segment> {
        let mut min: Option<Segment> = None;
        let mut min_iteration = u64::MAX;

        for &segment in &self.cells[cell.index()].segments {
            let data = &self.segments[segment.index()];

            if !data.destroyed && (min.is_none() || data.last_used_iteration < min_iteration) {
                min = Some(segment);
                min_iteration = data.last_used_iteration;
            }
        }

        min
    }

    /// Total number of live segments.
    #[inline]
    pub fn num_segments(&self) -> usize {
        self.segment_ids.live()
    }

    /// Number of live segments on `cell`.
    pub fn num_segments_on_cell(&self, cell: Cell) -> Result<usize> {
        self.check_cell(cell)?;
        Ok(self.cells[cell.index()].num_live_segments())
    }

    /// All segments on `cell`, including destroyed ones, in allocation order.
    pub fn segments_for_cell(&self, cell: Cell) -> Result<&[Segment]> {
        self.check_cell(cell)?;
        Ok(self.cells[cell.index()].segments())
    }

    /// The live segments on `cell`, in allocation order.
    pub fn live_segments_for_cell(&self, cell: Cell) -> Result<Vec<Segment>> {
        self.check_cell(cell)?;
        Ok(self.cells[cell.index()]
            .segments
            .iter()
            .copied()
            .filter(|segment| !self.segments[segment.index()].destroyed)
            .collect())
    }

    pub fn cell_data(&self, cell: Cell) -> Result<&CellData> {
        self.check_cell(cell)?;
        Ok(&self.cells[cell.index()])
    }

    pub fn segment_data(&self, segment: Segment) -> Result<&SegmentData> {
        self.check_segment(segment)?;
        Ok(&self.segments[segment.index()])
    }

    /// The cell that owns `segment`.
    pub fn cell_for_segment(&self, segment: Segment) -> Result<Cell> {
        self.check_segment(segment)?;
        Ok(self.segments[segment.index()].cell)
    }

    // ------------------------------------------------------------------
    // Synapses
    // ------------------------------------------------------------------

    /// Creates a synapse on `segment` listening to `presynaptic_cell`.
    ///
    /// If the segment already holds `max_synapses_per_segment` live synapses, the one with the
    /// smallest permanence is destroyed first. A destroyed synapse slot on the segment is reused
    /// before a new handle is allocated. The permanence is clamped to the configured range.
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        presynaptic_cell: Cell,
        permanence: f64,
    ) -> Result<Synapse> {
        self.check_live_segment(segment)?;
        self.check_cell(presynaptic_cell)?;
        let permanence = self.clamp_permanence(permanence)?;

        while self.segments[segment.index()].num_live_synapses()
            >= self.params.max_synapses_per_segment
        {
            let Some(weakest) = self.min_permanence_synapse(segment) else {
                panic!("{segment} is at synapse capacity but has no live synapse to evict");
            };

            debug!(
                %segment,
                synapse = %weakest,
                permanence = self.synapses[weakest.index()].permanence,
                "Evicting weakest synapse"
            );
            self.destroy_synapse_unchecked(weakest);
        }

        let segment_data = &mut self.segments[segment.index()];

        let synapse = if let Some(reuse) = segment_data.destroyed_synapses.pop_first() {
            let data = &mut self.synapses[reuse.index()];
            assert!(
                data.destroyed && data.segment == segment,
                "Free list of {segment} holds {reuse}, which is not a destroyed synapse of that segment"
            );

            data.destroyed = false;
            data.presynaptic_cell = presynaptic_cell;
            self.synapse_ids.reactivate();
            reuse
        } else {
            let synapse = Synapse::new(self.synapse_ids.allocate());
            debug_assert_eq!(synapse.index(), self.synapses.len());

            self.synapses.push(SynapseData::new(segment, presynaptic_cell));
            segment_data.synapses.push(synapse);
            synapse
        };

        self.receptors.insert(presynaptic_cell, synapse);

        self.synapses[synapse.index()].permanence = permanence;
        if permanence >= self.params.connected_permanence {
            self.segments[segment.index()].num_connected += 1;
        }

        trace!(%segment, %synapse, %presynaptic_cell, permanence, "Created synapse");

        Ok(synapse)
    }

    /// Destroys `synapse`. Destroying a destroyed synapse is a no-op.
    pub fn destroy_synapse(&mut self, synapse: Synapse) -> Result<()> {
        self.check_synapse(synapse)?;
        self.destroy_synapse_unchecked(synapse);
        Ok(())
    }

    pub(crate) fn destroy_synapse_unchecked(&mut self, synapse: Synapse) {
        let connected_permanence = self.params.connected_permanence;
        let data = &mut self.synapses[synapse.index()];

        if data.destroyed {
            return;
        }

        self.receptors.remove(data.presynaptic_cell, synapse);
        data.destroyed = true;

        let segment = &mut self.segments[data.segment.index()];
        segment.destroyed_synapses.insert(synapse);
        if data.permanence >= connected_permanence {
            segment.num_connected -= 1;
        }

        self.synapse_ids.release();
    }

    /// Sets the permanence of a live synapse, clamped to the configured range.
    pub fn update_permanence(&mut self, synapse: Synapse, permanence: f64) -> Result<()> {
        self.check_synapse(synapse)?;
        let permanence = self.clamp_permanence(permanence)?;

        let connected_permanence = self.params.connected_permanence;
        let data = &mut self.synapses[synapse.index()];

        if data.destroyed {
            return Err(ConnectionsError::DestroyedSynapse(synapse.index()));
        }

        let was_connected = data.permanence >= connected_permanence;
        let is_connected = permanence >= connected_permanence;
        data.permanence = permanence;

        if was_connected != is_connected {
            let segment = &mut self.segments[data.segment.index()];
            if is_connected {
                segment.num_connected += 1;
            } else {
                segment.num_connected -= 1;
            }
        }

        Ok(())
    }

    /// The live synapse on `segment` with the smallest permanence. First found wins ties within
    /// `EPSILON`.
    fn min_permanence_synapse(&self, segment: Segment) -> Option<Synapse> {
        let mut min: Option<Synapse> = None;
        let mut min_permanence = f64::MAX;

        for &synapse in &self.segments[segment.index()].synapses {
            let data = &self.synapses[synapse.index()];

            if !data.destroyed && data.permanence < min_permanence - EPSILON {
                min = Some(synapse);
                min_permanence = data.permanence;
            }
        }

        min
    }

    /// Total number of live synapses.
    #[inline]
    pub fn num_synapses(&self) -> usize {
        self.synapse_ids.live()
    }

    /// Number of live synapses on `segment`.
    pub fn num_synapses_on_segment(&self, segment: Segment) -> Result<usize> {
        self.check_segment(segment)?;
        Ok(self.segments[segment.index()].num_live_synapses())
    }

    /// All synapses on `segment`, including destroyed ones, in allocation order.
    pub fn synapses_for_segment(&self, segment: Segment) -> Result<&[Synapse]> {
        self.check_segment(segment)?;
        Ok(self.segments[segment.index()].synapses())
    }

    /// The live synapses on `segment`, in allocation order.
    pub fn live_synapses_for_segment(&self, segment: Segment) -> Result<Vec<Synapse>> {
        self.check_segment(segment)?;
        Ok(self.segments[segment.index()]
            .synapses
            .iter()
            .copied()
            .filter(|synapse| !self.synapses[synapse.index()].destroyed)
            .collect())
    }

    pub fn synapse_data(&self, synapse: Synapse) -> Result<&SynapseData> {
        self.check_synapse(synapse)?;
        Ok(&self.synapses[synapse.index()])
    }

    /// The segment that owns `synapse`.
    pub fn segment_for_synapse(&self, synapse: Synapse) -> Result<Segment> {
        self.check_synapse(synapse)?;
        Ok(self.synapses[synapse.index()].segment)
    }

    // ------------------------------------------------------------------
    // Receptor index
    // ------------------------------------------------------------------

    /// The live synapses targeting `cell`, sorted by index.
    pub fn receptor_synapses(&self, cell: Cell) -> Result<Vec<Synapse>> {
        self.check_cell(cell)?;

        let mut synapses: Vec<Synapse> = self
            .receptors
            .synapses_for(cell)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        synapses.sort_unstable();

        Ok(synapses)
    }

    /// A copy of the whole receptor index. Meant for tests and inspection.
    pub fn receptor_synapse_mapping(&self) -> FxHashMap<Cell, Vec<Synapse>> {
        self.receptors.snapshot()
    }

    #[inline]
    pub fn receptor_index(&self) -> &ReceptorIndex {
        &self.receptors
    }

    // ------------------------------------------------------------------
    // Learning state
    // ------------------------------------------------------------------

    #[inline]
    pub fn active_cells(&self) -> &[Cell] {
        &self.active_cells
    }

    pub fn set_active_cells(&mut self, cells: Vec<Cell>) {
        self.active_cells = cells;
    }

    #[inline]
    pub fn winner_cells(&self) -> &[Cell] {
        &self.winner_cells
    }

    pub fn set_winner_cells(&mut self, cells: Vec<Cell>) {
        self.winner_cells = cells;
    }

    #[inline]
    pub fn active_segment_overlaps(&self) -> &[SegmentOverlap] {
        &self.active_segment_overlaps
    }

    /// Replaces the active segment overlaps. The predictive cells cache is left untouched and
    /// keeps serving the previous view until `clear_predictive_cells` is called.
    pub fn set_active_segment_overlaps(&mut self, overlaps: Vec<SegmentOverlap>) {
        self.active_segment_overlaps = overlaps;
    }

    #[inline]
    pub fn matching_segment_overlaps(&self) -> &[SegmentOverlap] {
        &self.matching_segment_overlaps
    }

    pub fn set_matching_segment_overlaps(&mut self, overlaps: Vec<SegmentOverlap>) {
        self.matching_segment_overlaps = overlaps;
    }

    /// Drops the cached predictive cells so the next request recomputes them.
    pub fn clear_predictive_cells(&mut self) {
        self.predictive_cells = None;
    }

    /// Clears the learning state of the current time step. The graph itself is kept.
    pub fn clear(&mut self) {
        self.active_cells.clear();
        self.winner_cells.clear();
        self.active_segment_overlaps.clear();
        self.matching_segment_overlaps.clear();
        self.predictive_cells = None;
    }
}
