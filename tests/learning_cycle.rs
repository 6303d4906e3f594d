use htm_connections::core::activity::{ActivityThresholds, SegmentOverlap};
use htm_connections::core::connections::Connections;
use htm_connections::core::ids::Cell;
use htm_connections::core::params::ConnectionsParams;

fn params() -> ConnectionsParams {
    ConnectionsParams {
        num_columns: 16,
        cells_per_column: 4,
        activation_threshold: 3,
        min_threshold: 2,
        max_new_synapse_count: 4,
        ..Default::default()
    }
}

/// Learns the transition "column 0 -> column 5" and checks that the grown segment on column 5
/// goes from matching to active as its synapses are reinforced.
#[test]
fn segment_becomes_active_after_reinforcement() {
    let params = params();
    let mut rng = params.seeded_rng();
    let mut conn = Connections::new(params.clone()).unwrap();
    let thresholds = ActivityThresholds::from_params(&params);

    let previous: Vec<Cell> = conn.column(0).unwrap().iter_cells().collect();

    let cell = conn.least_used_cell(5, &mut rng).unwrap();
    let segment = conn.create_segment(cell).unwrap();
    let grown = conn
        .grow_synapses(
            segment,
            &previous,
            params.max_new_synapse_count,
            params.initial_permanence,
            &mut rng,
        )
        .unwrap();
    assert_eq!(grown, 4);

    let activity = conn.compute_activity(&previous, &thresholds, true).unwrap();
    assert!(activity.active_segments.is_empty());
    assert_eq!(activity.matching_segments, vec![SegmentOverlap::new(segment, cell, 4)]);

    for _ in 0..3 {
        conn.adapt_segment(
            segment,
            &previous,
            params.permanence_increment,
            params.permanence_decrement,
        )
        .unwrap();
    }

    let activity = conn.compute_activity(&previous, &thresholds, true).unwrap();
    assert_eq!(activity.active_segments, vec![SegmentOverlap::new(segment, cell, 4)]);
    assert_eq!(conn.iteration(), 2);
    assert_eq!(conn.segment_data(segment).unwrap().last_used_iteration(), 2);

    conn.set_active_segment_overlaps(activity.active_segments);
    conn.set_matching_segment_overlaps(activity.matching_segments);
    assert_eq!(conn.predictive_cells(), &[cell]);
    assert_eq!(conn.column_index_for_segment(segment).unwrap(), 5);
}

#[test]
fn lru_eviction_follows_activity_stamps() {
    let mut conn = Connections::new(ConnectionsParams {
        max_segments_per_cell: 2,
        ..params()
    })
    .unwrap();
    let thresholds = ActivityThresholds::new(0.5, 1, 0.1, 1);
    let cell = Cell::new(20);
    let input = Cell::new(1);

    let older = conn.create_segment(cell).unwrap();
    conn.create_synapse(older, input, 0.8).unwrap();
    let newer = conn.create_segment(cell).unwrap();

    // the older segment fires and becomes the most recently used one
    conn.compute_activity(&[input], &thresholds, true).unwrap();

    let third = conn.create_segment(cell).unwrap();

    assert_eq!(third, newer);
    assert_eq!(conn.num_segments_on_cell(cell).unwrap(), 2);
    assert!(!conn.segment_data(older).unwrap().is_destroyed());
    assert_eq!(conn.receptor_synapses(input).unwrap().len(), 1);
}

#[test]
fn params_deserialize_with_defaults() {
    let params: ConnectionsParams =
        serde_json::from_str(r#"{ "num_columns": 64, "cells_per_column": 8 }"#).unwrap();

    assert_eq!(params.num_cells(), 512);
    assert_eq!(params.max_segments_per_cell, 255);
    assert_eq!(params.initial_permanence, 0.21);
    assert!(Connections::new(params).is_ok());
}
