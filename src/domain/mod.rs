// Domain layer - Chart pipeline models
pub mod chart;
pub mod filter;
pub mod query;
pub mod result_set;
