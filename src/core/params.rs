//! Configuration of the connections store.
//!
//! The parameters are plain data. They can be built in code (usually via struct update syntax on
//! top of `Default`) or deserialized from any serde format; missing fields fall back to defaults.

use crate::error::{ConnectionsError, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Holds the dimensions, capacity limits and learning parameters of the distal dendrite graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionsParams {
    /// Number of columns.
    pub num_columns: usize,

    /// Number of cells in every column.
    pub cells_per_column: usize,

    /// Maximum number of live segments on a cell. Exceeding it evicts the least recently used one.
    pub max_segments_per_cell: usize,

    /// Maximum number of live synapses on a segment. Exceeding it evicts the weakest one.
    pub max_synapses_per_segment: usize,

    /// Number of active connected synapses for a segment to become active.
    pub activation_threshold: usize,

    /// Number of active potential synapses for a segment to become matching.
    pub min_threshold: usize,

    /// Permanence at or above which a synapse counts as connected.
    pub connected_permanence: f64,

    /// Permanence given to newly grown synapses.
    pub initial_permanence: f64,

    pub permanence_increment: f64,

    pub permanence_decrement: f64,

    /// Punishment applied to matching segments of columns that did not become active.
    pub predicted_segment_decrement: f64,

    /// Maximum number of synapses grown on a segment in one learning step.
    pub max_new_synapse_count: usize,

    /// Radius around a column that winner cells are drawn from when growing synapses.
    pub learning_radius: usize,

    /// Lower bound of a synapse permanence.
    pub permanence_min: f64,

    /// Upper bound of a synapse permanence.
    pub permanence_max: f64,

    /// Seed for the random generator handed to learning operations.
    pub seed: u64,
}

impl Default for ConnectionsParams {
    fn default() -> Self {
        Self {
            num_columns: 2048,
            cells_per_column: 32,
            max_segments_per_cell: 255,
            max_synapses_per_segment: 255,
            activation_threshold: 13,
            min_threshold: 10,
            connected_permanence: 0.5,
            initial_permanence: 0.21,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_segment_decrement: 0.0,
            max_new_synapse_count: 20,
            learning_radius: 2048,
            permanence_min: 0.0,
            permanence_max: 1.0,
            seed: 42,
        }
    }
}

impl ConnectionsParams {
    /// Total number of cells across all columns.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.num_columns * self.cells_per_column
    }

    /// Creates a fresh generator from `seed`. Learning operations take it by `&mut`.
    pub fn seeded_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Checks that the parameters describe a usable store.
    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &'static str, message: impl Into<String>) -> Result<()> {
            Err(ConnectionsError::InvalidParameter {
                name,
                message: message.into(),
            })
        }

        if self.num_columns == 0 {
            return invalid("num_columns", "must be at least 1");
        }
        if self.cells_per_column == 0 {
            return invalid("cells_per_column", "must be at least 1");
        }
        if self.num_columns.checked_mul(self.cells_per_column).is_none() {
            return invalid("cells_per_column", "total number of cells overflows usize");
        }
        if self.max_segments_per_cell == 0 {
            return invalid("max_segments_per_cell", "must be at least 1");
        }
        if self.max_synapses_per_segment == 0 {
            return invalid("max_synapses_per_segment", "must be at least 1");
        }
        if !(self.permanence_min <= self.permanence_max) {
            return invalid(
                "permanence_min",
                format!(
                    "{} is not below permanence_max {}",
                    self.permanence_min, self.permanence_max
                ),
            );
        }

        let in_range = |value: f64| (self.permanence_min..=self.permanence_max).contains(&value);

        if !in_range(self.connected_permanence) {
            return invalid("connected_permanence", "outside the permanence range");
        }
        if !in_range(self.initial_permanence) {
            return invalid("initial_permanence", "outside the permanence range");
        }

        for (name, value) in [
            ("permanence_increment", self.permanence_increment),
            ("permanence_decrement", self.permanence_decrement),
            ("predicted_segment_decrement", self.predicted_segment_decrement),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(name, format!("{value} must be finite and non-negative"));
            }
        }

        Ok(())
    }
}
