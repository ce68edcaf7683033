pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod types;

// Layered boundaries: ports the pipeline depends on, and their implementations
pub mod app;
pub mod infra;
