//! Handles for the entities of the connectivity graph.
//!
//! Cells, segments and synapses refer to each other through these integer handles only, never
//! through references. The graph is cyclic (cell -> segment -> synapse -> presynaptic cell), so
//! handles keep ownership flat: the store owns every record in a dense vec and a handle is just
//! the position of a record in that vec.

use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// The dense index of the entity.
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// A cell, addressed by its flat index `column * cells_per_column + offset`.
    Cell
);

handle!(
    /// A distal dendrite segment. The index is assigned once and survives destroy/reuse cycles.
    Segment
);

handle!(
    /// A synapse on a distal segment. Indexed in its own counter space, separate from segments.
    Synapse
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_order_by_index() {
        let mut cells = vec![Cell::new(7), Cell::new(2), Cell::from(5)];
        cells.sort();

        assert_eq!(cells, vec![Cell::new(2), Cell::new(5), Cell::new(7)]);
        assert_eq!(cells[1].index(), 5);
    }

    #[test]
    fn test_display() {
        assert_eq!(Segment::new(3).to_string(), "Segment(3)");
        assert_eq!(Synapse::new(0).to_string(), "Synapse(0)");
    }
}
