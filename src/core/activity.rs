//! Activity computation over the distal dendrite graph.
//!
//! Given the currently active cells, every synapse listening to one of them (found through the
//! receptor index) adds to the overlap of its segment:
//! - a synapse at or above the matching permanence counts toward the matching overlap,
//! - a synapse additionally at or above the active permanence counts toward the active overlap.
//!
//! Segments whose overlap reaches the respective synapse threshold are reported as active or
//! matching. Overlaps are accumulated in dense vecs indexed by segment handle, which is why the
//! store keeps segment handles dense and reuses destroyed slots.
//!
//! With `record_iteration`, the temporal memory iteration advances once per call and every active
//! segment is stamped with it. Those stamps drive least-recently-used segment eviction.

use super::connections::{Connections, EPSILON};
use super::ids::{Cell, Segment};
use super::params::ConnectionsParams;
use crate::error::Result;
use fxhash::FxHashSet;
use tracing::warn;

/// Permanence and synapse count thresholds for active and matching segments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActivityThresholds {
    /// Permanence at which a synapse counts toward the active overlap.
    pub active_permanence: f64,

    /// Active overlap at which a segment becomes active.
    pub active_synapses: usize,

    /// Permanence at which a synapse counts toward the matching overlap.
    pub matching_permanence: f64,

    /// Matching overlap at which a segment becomes matching.
    pub matching_synapses: usize,
}

impl ActivityThresholds {
    pub fn new(
        active_permanence: f64,
        active_synapses: usize,
        matching_permanence: f64,
        matching_synapses: usize,
    ) -> Self {
        Self {
            active_permanence,
            active_synapses,
            matching_permanence,
            matching_synapses,
        }
    }

    /// Active segments need `activation_threshold` connected synapses, matching segments need
    /// `min_threshold` potential synapses of any permanence.
    pub fn from_params(params: &ConnectionsParams) -> Self {
        Self::new(
            params.connected_permanence,
            params.activation_threshold,
            0.0,
            params.min_threshold,
        )
    }

    /// True if every active segment is guaranteed to also be matching.
    pub fn is_ordered(&self) -> bool {
        self.active_permanence >= self.matching_permanence
            && self.active_synapses >= self.matching_synapses
    }
}

/// A segment together with its overlap for the current input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentOverlap {
    pub segment: Segment,

    /// The cell owning `segment`.
    pub cell: Cell,

    pub overlap: usize,
}

impl SegmentOverlap {
    pub fn new(segment: Segment, cell: Cell, overlap: usize) -> Self {
        Self {
            segment,
            cell,
            overlap,
        }
    }
}

/// Result of `compute_activity`. Both lists are sorted by owning cell index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Activity {
    pub active_segments: Vec<SegmentOverlap>,
    pub matching_segments: Vec<SegmentOverlap>,
}

impl Connections {
    /// Computes the active and matching segments for the given active cells.
    ///
    /// - Walks the receptor index of every active cell and accumulates overlaps per segment.
    /// - If `record_iteration` is set, advances the iteration by one and stamps it on every
    ///   active segment.
    /// - Returns the active and matching segments sorted by owning cell index. Segments on the
    ///   same cell keep their index order.
    ///
    /// A cell listed more than once in `active_cells` counts once.
    ///
    /// Fails without touching any state if an active cell is out of range.
    pub fn compute_activity(
        &mut self,
        active_cells: &[Cell],
        thresholds: &ActivityThresholds,
        record_iteration: bool,
    ) -> Result<Activity> {
        for &cell in active_cells {
            self.check_cell(cell)?;
        }

        if !thresholds.is_ordered() {
            warn!(
                ?thresholds,
                "Active thresholds are looser than matching thresholds, active segments may not be matching"
            );
        }

        let next_segment = self.segment_ids.next_index();
        let mut num_active_synapses = vec![0usize; next_segment];
        let mut num_matching_synapses = vec![0usize; next_segment];

        let active_cells: FxHashSet<Cell> = active_cells.iter().copied().collect();

        for cell in active_cells {
            let Some(synapses) = self.receptors.synapses_for(cell) else {
                continue;
            };

            for &synapse in synapses {
                let data = &self.synapses[synapse.index()];
                let segment = data.segment.index();

                if data.permanence - thresholds.matching_permanence > -EPSILON {
                    num_matching_synapses[segment] += 1;

                    if data.permanence - thresholds.active_permanence > -EPSILON {
                        num_active_synapses[segment] += 1;
                    }
                }
            }
        }

        if record_iteration {
            self.iteration += 1;
        }

        let mut active_segments = Vec::new();
        for (index, &overlap) in num_active_synapses.iter().enumerate() {
            // untouched slots carry no segment, even for a zero threshold
            if overlap == 0 || overlap < thresholds.active_synapses {
                continue;
            }

            let data = &mut self.segments[index];
            if record_iteration {
                data.last_used_iteration = self.iteration;
            }
            active_segments.push(SegmentOverlap::new(Segment::new(index), data.cell, overlap));
        }

        let mut matching_segments = Vec::new();
        for (index, &overlap) in num_matching_synapses.iter().enumerate() {
            if overlap == 0 || overlap < thresholds.matching_synapses {
                continue;
            }

            let cell = self.segments[index].cell;
            matching_segments.push(SegmentOverlap::new(Segment::new(index), cell, overlap));
        }

        active_segments.sort_by_key(|overlap| overlap.cell);
        matching_segments.sort_by_key(|overlap| overlap.cell);

        Ok(Activity {
            active_segments,
            matching_segments,
        })
    }

    /// The cells with an active segment, ordered by column and without duplicates.
    ///
    /// Derived from `active_segment_overlaps` on first request and cached until
    /// `clear_predictive_cells` or `clear` is called. Replacing the overlaps alone does not
    /// refresh a non-empty cache. An empty cache is rebuilt on every request.
    pub fn predictive_cells(&mut self) -> &[Cell] {
        let cells_per_column = self.params.cells_per_column;
        let overlaps = &self.active_segment_overlaps;

        if self.predictive_cells.as_ref().is_some_and(Vec::is_empty) {
            self.predictive_cells = None;
        }

        self.predictive_cells.get_or_insert_with(|| {
            let mut by_column = overlaps.clone();
            by_column.sort_by_key(|overlap| overlap.cell.index() / cells_per_column);

            let mut seen = FxHashSet::default();
            by_column
                .iter()
                .map(|overlap| overlap.cell)
                .filter(|&cell| seen.insert(cell))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connections() -> Connections {
        Connections::new(ConnectionsParams {
            num_columns: 8,
            cells_per_column: 4,
            ..Default::default()
        })
        .unwrap()
    }

    fn thresholds() -> ActivityThresholds {
        ActivityThresholds::new(0.5, 2, 0.1, 1)
    }

    #[test]
    fn test_matching_but_not_active() {
        let mut conn = connections();
        let x = Cell::new(3);
        let seg = conn.create_segment(Cell::new(20)).unwrap();
        conn.create_synapse(seg, x, 0.21).unwrap();

        let activity = conn
            .compute_activity(&[x], &ActivityThresholds::new(0.5, 1, 0.1, 1), false)
            .unwrap();

        assert!(activity.active_segments.is_empty());
        assert_eq!(
            activity.matching_segments,
            vec![SegmentOverlap::new(seg, Cell::new(20), 1)]
        );
    }

    #[test]
    fn test_active_and_matching_overlaps() {
        let mut conn = connections();
        let seg = conn.create_segment(Cell::new(0)).unwrap();
        conn.create_synapse(seg, Cell::new(10), 0.6).unwrap();
        conn.create_synapse(seg, Cell::new(11), 0.5).unwrap();
        conn.create_synapse(seg, Cell::new(12), 0.2).unwrap();
        conn.create_synapse(seg, Cell::new(13), 0.05).unwrap();
        conn.create_synapse(seg, Cell::new(14), 0.9).unwrap();

        let active = [Cell::new(10), Cell::new(11), Cell::new(12), Cell::new(13)];
        let activity = conn.compute_activity(&active, &thresholds(), false).unwrap();

        assert_eq!(activity.active_segments, vec![SegmentOverlap::new(seg, Cell::new(0), 2)]);
        assert_eq!(activity.matching_segments, vec![SegmentOverlap::new(seg, Cell::new(0), 3)]);
    }

    #[test]
    fn test_permanence_within_epsilon_counts() {
        let mut conn = connections();
        let seg = conn.create_segment(Cell::new(0)).unwrap();
        conn.create_synapse(seg, Cell::new(10), 0.499995).unwrap();

        let activity = conn
            .compute_activity(&[Cell::new(10)], &ActivityThresholds::new(0.5, 1, 0.5, 1), false)
            .unwrap();

        assert_eq!(activity.active_segments.len(), 1);
    }

    #[test]
    fn test_record_iteration_increments_once_and_stamps_active() {
        let mut conn = connections();
        let active_seg = conn.create_segment(Cell::new(1)).unwrap();
        let matching_seg = conn.create_segment(Cell::new(2)).unwrap();
        for presynaptic in 10..15 {
            conn.create_synapse(active_seg, Cell::new(presynaptic), 0.8).unwrap();
            conn.create_synapse(matching_seg, Cell::new(presynaptic), 0.2).unwrap();
        }

        let active: Vec<Cell> = (10..15).map(Cell::new).collect();
        let activity = conn.compute_activity(&active, &thresholds(), true).unwrap();

        assert_eq!(conn.iteration(), 1);
        assert_eq!(activity.active_segments.len(), 1);
        assert_eq!(activity.matching_segments.len(), 2);
        assert_eq!(conn.segment_data(active_seg).unwrap().last_used_iteration(), 1);
        assert_eq!(conn.segment_data(matching_seg).unwrap().last_used_iteration(), 0);

        conn.compute_activity(&active, &thresholds(), false).unwrap();
        assert_eq!(conn.iteration(), 1);
    }

    #[test]
    fn test_results_sorted_by_cell() {
        let mut conn = connections();
        let x = Cell::new(31);

        let mut segments = Vec::new();
        for cell in [9, 2, 5, 2] {
            let seg = conn.create_segment(Cell::new(cell)).unwrap();
            conn.create_synapse(seg, x, 0.6).unwrap();
            segments.push(seg);
        }

        let activity = conn
            .compute_activity(&[x], &ActivityThresholds::new(0.5, 1, 0.1, 1), false)
            .unwrap();

        let order: Vec<Segment> = activity.active_segments.iter().map(|o| o.segment).collect();
        assert_eq!(order, vec![segments[1], segments[3], segments[2], segments[0]]);

        let cells: Vec<usize> = activity
            .matching_segments
            .iter()
            .map(|o| o.cell.index())
            .collect();
        assert_eq!(cells, vec![2, 2, 5, 9]);
    }

    #[test]
    fn test_destroyed_segments_do_not_contribute() {
        let mut conn = connections();
        let x = Cell::new(7);
        let seg0 = conn.create_segment(Cell::new(0)).unwrap();
        let seg1 = conn.create_segment(Cell::new(1)).unwrap();
        conn.create_synapse(seg0, x, 0.6).unwrap();
        conn.create_synapse(seg1, x, 0.6).unwrap();

        conn.destroy_segment(seg0).unwrap();

        let activity = conn
            .compute_activity(&[x], &ActivityThresholds::new(0.5, 1, 0.1, 1), false)
            .unwrap();

        assert_eq!(activity.active_segments, vec![SegmentOverlap::new(seg1, Cell::new(1), 1)]);
    }

    #[test]
    fn test_zero_threshold_skips_untouched_segments() {
        let mut conn = connections();
        conn.create_segment(Cell::new(0)).unwrap();

        let activity = conn
            .compute_activity(&[Cell::new(1)], &ActivityThresholds::new(0.5, 0, 0.1, 0), false)
            .unwrap();

        assert_eq!(activity, Activity::default());
    }

    #[test]
    fn test_invalid_active_cell_leaves_state_untouched() {
        let mut conn = connections();

        assert!(conn
            .compute_activity(&[Cell::new(0), Cell::new(32)], &thresholds(), true)
            .is_err());
        assert_eq!(conn.iteration(), 0);
    }

    #[test]
    fn test_predictive_cells_sorted_by_column_and_deduplicated() {
        let mut conn = connections();
        let seg_a = conn.create_segment(Cell::new(9)).unwrap();
        let seg_b = conn.create_segment(Cell::new(1)).unwrap();
        let seg_c = conn.create_segment(Cell::new(9)).unwrap();
        let seg_d = conn.create_segment(Cell::new(0)).unwrap();

        conn.set_active_segment_overlaps(vec![
            SegmentOverlap::new(seg_a, Cell::new(9), 1),
            SegmentOverlap::new(seg_b, Cell::new(1), 1),
            SegmentOverlap::new(seg_c, Cell::new(9), 1),
            SegmentOverlap::new(seg_d, Cell::new(0), 1),
        ]);

        // cells 1 and 0 share column 0 and keep their relative order
        assert_eq!(
            conn.predictive_cells(),
            &[Cell::new(1), Cell::new(0), Cell::new(9)]
        );
    }

    #[test]
    fn test_predictive_cells_cached_until_cleared() {
        let mut conn = connections();
        let seg_a = conn.create_segment(Cell::new(4)).unwrap();
        let seg_b = conn.create_segment(Cell::new(8)).unwrap();

        conn.set_active_segment_overlaps(vec![SegmentOverlap::new(seg_a, Cell::new(4), 1)]);
        assert_eq!(conn.predictive_cells(), &[Cell::new(4)]);

        conn.set_active_segment_overlaps(vec![SegmentOverlap::new(seg_b, Cell::new(8), 1)]);
        assert_eq!(conn.predictive_cells(), &[Cell::new(4)]);

        conn.clear_predictive_cells();
        assert_eq!(conn.predictive_cells(), &[Cell::new(8)]);

        conn.clear();
        assert!(conn.predictive_cells().is_empty());
    }

    #[test]
    fn test_empty_predictive_cells_are_recomputed() {
        let mut conn = connections();
        let seg = conn.create_segment(Cell::new(5)).unwrap();

        assert!(conn.predictive_cells().is_empty());

        conn.set_active_segment_overlaps(vec![SegmentOverlap::new(seg, Cell::new(5), 1)]);
        assert_eq!(conn.predictive_cells(), &[Cell::new(5)]);

        conn.set_active_segment_overlaps(Vec::new());
        assert_eq!(conn.predictive_cells(), &[Cell::new(5)]);
    }

    #[test]
    fn test_repeated_active_cell_counts_once() {
        let mut conn = connections();
        let x = Cell::new(3);
        let seg = conn.create_segment(Cell::new(20)).unwrap();
        conn.create_synapse(seg, x, 0.8).unwrap();

        let activity = conn.compute_activity(&[x, x, x], &thresholds(), false).unwrap();

        assert!(activity.active_segments.is_empty());
        assert_eq!(activity.matching_segments, vec![SegmentOverlap::new(seg, Cell::new(20), 1)]);
    }

    #[test]
    fn test_threshold_ordering() {
        assert!(thresholds().is_ordered());
        assert!(!ActivityThresholds::new(0.1, 1, 0.5, 1).is_ordered());
    }
}
