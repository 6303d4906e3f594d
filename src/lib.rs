//! Distal dendrite connectivity for Hierarchical Temporal Memory (HTM).
//!
//! The crate stores the sparse graph of columns, cells, dendritic segments and synapses that a
//! temporal memory learns on, and computes which segments become active or matching for a set of
//! currently active cells. Everything lives in [`core::connections::Connections`].

pub mod core;
pub mod error;

pub use error::{ConnectionsError, Result};
