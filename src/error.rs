//! Error types for the connections store.
//!
//! Only invalid arguments surface as errors. Capacity pressure is handled by eviction and
//! corrupted internal state aborts loudly with a panic.

use thiserror::Error;

/// Errors returned by [`Connections`](crate::core::connections::Connections) operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionsError {
    #[error("cell {cell} out of range (num cells: {num_cells})")]
    CellOutOfRange { cell: usize, num_cells: usize },

    #[error("column {column} out of range (num columns: {num_columns})")]
    ColumnOutOfRange { column: usize, num_columns: usize },

    #[error("segment {segment} was never allocated (next index: {next})")]
    SegmentOutOfRange { segment: usize, next: usize },

    #[error("synapse {synapse} was never allocated (next index: {next})")]
    SynapseOutOfRange { synapse: usize, next: usize },

    #[error("segment {0} is destroyed")]
    DestroyedSegment(usize),

    #[error("synapse {0} is destroyed")]
    DestroyedSynapse(usize),

    #[error("permanence {0} is not a number")]
    InvalidPermanence(f64),

    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ConnectionsError>;
