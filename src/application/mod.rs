// Application layer - Query building, series transformation and chart orchestration
pub mod error;
pub mod filter_builder;
pub mod filter_store;
pub mod orchestrator;
pub mod query_backend;
pub mod series_transformer;
pub mod template;
