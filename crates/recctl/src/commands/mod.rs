//! Subcommand implementations over the recommender store

pub mod apps;
pub mod resources;
pub mod timeframes;
