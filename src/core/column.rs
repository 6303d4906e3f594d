//! A `Column` groups a fixed, contiguous range of cells.
//!
//! Biological inspiration:
//! Columns in HTM are inspired by cortical mini-columns found in the brain.
//! They consist of a group of neurons, which in HTM are modeled as "cells".
//!
//! Meaning in the connections store:
//! Columns and cells are created once from the configured dimensions and never destroyed.
//! Column `c` owns the cells `c * cells_per_column .. (c + 1) * cells_per_column`, so the owning
//! column of a cell is derived by division instead of being stored on the cell.
//! Each cell owns the distal segments grown on it, including destroyed ones kept for reuse.

use super::ids::{Cell, Segment};
use std::collections::BTreeSet;
use std::ops::Range;

/// Represents a column in the HTM model together with the cells it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// The index of the column.
    pub index: usize,

    /// Flat indices of the cells belonging to this column.
    pub cells: Range<usize>,
}

impl Column {
    /// Creates the column at `index` for a layout with `cells_per_column` cells in every column.
    pub fn new(index: usize, cells_per_column: usize) -> Self {
        let start = index * cells_per_column;
        Self {
            index,
            cells: start..start + cells_per_column,
        }
    }

    /// Iterates over the cells of the column in index order.
    pub fn iter_cells(&self) -> impl Iterator<Item = Cell> {
        self.cells.clone().map(Cell::new)
    }

    /// Returns true if `cell` belongs to this column.
    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell.index())
    }
}

/// The segments grown on a single cell.
#[derive(Debug, Default, Clone)]
pub struct CellData {
    /// All segments ever allocated on this cell, in allocation order, tombstones included.
    pub(crate) segments: Vec<Segment>,

    /// Tombstoned segments awaiting reuse. Segment indices grow with allocation order, so the
    /// smallest entry is the first destroyed segment in storage order.
    pub(crate) destroyed_segments: BTreeSet<Segment>,
}

impl CellData {
    /// All segments on the cell, including destroyed ones.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of destroyed segments awaiting reuse.
    #[inline]
    pub fn num_destroyed_segments(&self) -> usize {
        self.destroyed_segments.len()
    }

    /// Number of live segments.
    #[inline]
    pub fn num_live_segments(&self) -> usize {
        self.segments.len() - self.destroyed_segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_cell_range() {
        let column = Column::new(3, 4);

        assert_eq!(column.cells, 12..16);
        assert!(column.contains(Cell::new(12)));
        assert!(!column.contains(Cell::new(16)));
        assert_eq!(
            column.iter_cells().collect::<Vec<_>>(),
            vec![Cell::new(12), Cell::new(13), Cell::new(14), Cell::new(15)]
        );
    }

    #[test]
    fn test_cell_data_counts() {
        let mut data = CellData::default();
        data.segments.extend([Segment::new(0), Segment::new(4), Segment::new(9)]);
        data.destroyed_segments.insert(Segment::new(4));

        assert_eq!(data.num_destroyed_segments(), 1);
        assert_eq!(data.num_live_segments(), 2);
    }
}
