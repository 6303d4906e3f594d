pub mod activity;
pub mod arena;
pub mod column;
pub mod connections;
pub mod ids;
pub mod learning;
pub mod params;
pub mod synapses;
