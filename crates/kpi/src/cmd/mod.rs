//! CLI subcommands

pub mod channels;
pub mod filter_values;
pub mod query;
pub mod transform;
