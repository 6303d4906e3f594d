//! This example learns a short repeating sequence of columns with a minimal temporal memory loop
//! built on `Connections`. Each step:
//! - computes the active and matching segments for the cells that were active one step earlier,
//! - reinforces the segments that predicted the current column, or grows a new segment on the
//!   least used cell when the column was not predicted (bursting).
//!
//! After a few passes every transition is predicted and the columns stop bursting.
//! Run with `RUST_LOG=htm_connections=debug` to watch segments being created and evicted.

use anyhow::Result;
use htm_connections::core::activity::{ActivityThresholds, SegmentOverlap};
use htm_connections::core::connections::Connections;
use htm_connections::core::ids::Cell;
use htm_connections::core::params::ConnectionsParams;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SEQUENCE: [usize; 6] = [3, 17, 8, 29, 12, 21];
const PASSES: usize = 8;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let params = ConnectionsParams {
        num_columns: 32,
        cells_per_column: 4,
        activation_threshold: 2,
        min_threshold: 1,
        max_new_synapse_count: 4,
        ..Default::default()
    };
    let thresholds = ActivityThresholds::from_params(&params);
    let mut rng = params.seeded_rng();
    let mut conn = Connections::new(params.clone())?;

    info!(
        columns = conn.num_columns(),
        cells = conn.num_cells(),
        "Learning a sequence of {} columns",
        SEQUENCE.len()
    );

    for pass in 0..PASSES {
        let mut previous_active: Vec<Cell> = Vec::new();
        let mut previous_winners: Vec<Cell> = Vec::new();
        let mut predicted_steps = 0;

        for &column_index in &SEQUENCE {
            let activity = conn.compute_activity(&previous_active, &thresholds, true)?;
            let column = conn.column(column_index)?;

            let active_in_column: Vec<SegmentOverlap> = activity
                .active_segments
                .iter()
                .copied()
                .filter(|overlap| column.contains(overlap.cell))
                .collect();

            let (active, winners) = if !active_in_column.is_empty() {
                predicted_steps += 1;

                let mut cells = Vec::new();
                for overlap in &active_in_column {
                    conn.adapt_segment(
                        overlap.segment,
                        &previous_active,
                        params.permanence_increment,
                        params.permanence_decrement,
                    )?;
                    cells.push(overlap.cell);
                }
                cells.dedup();
                (cells.clone(), cells)
            } else {
                let best_match = activity
                    .matching_segments
                    .iter()
                    .filter(|overlap| column.contains(overlap.cell))
                    .max_by_key(|overlap| overlap.overlap)
                    .copied();

                let (segment, winner) = match best_match {
                    Some(overlap) => {
                        conn.adapt_segment(
                            overlap.segment,
                            &previous_active,
                            params.permanence_increment,
                            params.permanence_decrement,
                        )?;
                        (overlap.segment, overlap.cell)
                    }
                    None => {
                        let cell = conn.least_used_cell(column_index, &mut rng)?;
                        (conn.create_segment(cell)?, cell)
                    }
                };

                // adaptation may have destroyed a segment that lost all of its synapses
                if !conn.segment_data(segment)?.is_destroyed() {
                    let missing = params
                        .max_new_synapse_count
                        .saturating_sub(conn.num_synapses_on_segment(segment)?);
                    conn.grow_synapses(
                        segment,
                        &previous_winners,
                        missing,
                        params.initial_permanence,
                        &mut rng,
                    )?;
                }

                (column.iter_cells().collect(), vec![winner])
            };

            previous_active = active;
            previous_winners = winners;
        }

        info!(
            pass,
            predicted = predicted_steps,
            segments = conn.num_segments(),
            synapses = conn.num_synapses(),
            "Finished pass"
        );

        conn.clear();
    }

    Ok(())
}
