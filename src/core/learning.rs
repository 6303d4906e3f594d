//! Learning operations on top of the connections store.
//!
//! These are the building blocks a temporal memory step uses after `compute_activity`:
//! - Reinforce or punish the synapses of a segment depending on which presynaptic cells were active.
//! - Grow new synapses from a segment to a random sample of candidate cells.
//! - Pick the cell of a column that should receive a new segment when the column bursts.
//!
//! Whatever needs randomness takes the generator as an argument, so a seeded run is reproducible
//! no matter how calls are interleaved.

use super::connections::{Connections, EPSILON};
use super::ids::{Cell, Segment};
use crate::error::Result;
use fxhash::FxHashSet;
use rand::prelude::*;
use tracing::debug;

impl Connections {
    /// Adjusts the permanences of a segment's synapses (Hebbian-like update):
    /// - Synapses whose presynaptic cell is in `active_cells` gain `increment`.
    /// - All other synapses lose `decrement`.
    /// - Permanences are clamped to the configured range.
    /// - Synapses whose permanence drops below `EPSILON` are destroyed, and the segment itself is
    ///   destroyed once it has no synapse left.
    ///
    /// A negative `increment` punishes active synapses instead of reinforcing them.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        active_cells: &[Cell],
        increment: f64,
        decrement: f64,
    ) -> Result<()> {
        self.check_live_segment(segment)?;
        Self::check_permanence(increment)?;
        Self::check_permanence(decrement)?;

        let active: FxHashSet<Cell> = active_cells.iter().copied().collect();

        for synapse in self.live_synapses_for_segment(segment)? {
            let data = &self.synapses[synapse.index()];

            let delta = if active.contains(&data.presynaptic_cell) {
                increment
            } else {
                -decrement
            };
            let permanence = (data.permanence + delta)
                .clamp(self.params.permanence_min, self.params.permanence_max);

            if permanence < EPSILON {
                self.destroy_synapse_unchecked(synapse);
            } else {
                self.update_permanence(synapse, permanence)?;
            }
        }

        if self.segments[segment.index()].num_live_synapses() == 0 {
            debug!(%segment, "Segment lost all synapses during adaptation");
            self.destroy_segment_unchecked(segment);
        }

        Ok(())
    }

    /// Punishes a segment that matched although its column did not become active. Active
    /// synapses lose `predicted_segment_decrement`, inactive ones are left alone.
    pub fn punish_segment(&mut self, segment: Segment, active_cells: &[Cell]) -> Result<()> {
        let decrement = self.params.predicted_segment_decrement;
        self.adapt_segment(segment, active_cells, -decrement, 0.0)
    }

    /// Grows up to `max_new` synapses from `segment` to randomly chosen `candidates`:
    /// - Candidates the segment already listens to are skipped.
    /// - The remaining candidates are shuffled and the first `max_new` are connected.
    ///
    /// Returns how many synapses were grown.
    pub fn grow_synapses<R: Rng>(
        &mut self,
        segment: Segment,
        candidates: &[Cell],
        max_new: usize,
        initial_permanence: f64,
        rng: &mut R,
    ) -> Result<usize> {
        self.check_live_segment(segment)?;
        for &cell in candidates {
            self.check_cell(cell)?;
        }
        let initial_permanence = self.clamp_permanence(initial_permanence)?;

        if max_new == 0 || candidates.is_empty() {
            return Ok(0);
        }

        let existing: FxHashSet<Cell> = self
            .live_synapses_for_segment(segment)?
            .into_iter()
            .map(|synapse| self.synapses[synapse.index()].presynaptic_cell)
            .collect();

        let mut candidates: Vec<Cell> = candidates
            .iter()
            .copied()
            .filter(|cell| !existing.contains(cell))
            .collect();

        // order must not depend on the caller's collection before shuffling
        candidates.sort_unstable();
        candidates.dedup();
        candidates.shuffle(rng);
        candidates.truncate(max_new);

        for &presynaptic_cell in &candidates {
            self.create_synapse(segment, presynaptic_cell, initial_permanence)?;
        }

        Ok(candidates.len())
    }

    /// Identifies and returns the cell with the fewest live segments within a column:
    /// - If multiple cells share the minimum, one of them is chosen at random.
    pub fn least_used_cell<R: Rng>(&self, column: usize, rng: &mut R) -> Result<Cell> {
        let column = self.column(column)?;
        let mut min_segments = usize::MAX;
        let mut min_cells = Vec::new();

        for cell in column.iter_cells() {
            let count = self.cells[cell.index()].num_live_segments();

            if count < min_segments {
                min_segments = count;
                min_cells.clear();
                min_cells.push(cell);
            } else if count == min_segments {
                min_cells.push(cell);
            }
        }

        let cell = if min_cells.len() > 1 {
            min_cells[rng.random_range(0..min_cells.len())]
        } else {
            min_cells[0]
        };

        Ok(cell)
    }
}
