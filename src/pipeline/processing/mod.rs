// Pipeline processing: schema mapping, consolidation, validation and aggregation

pub mod aggregate;
pub mod artifact;
pub mod cnpj;
pub mod consolidate;
pub mod schema_mapper;

pub use aggregate::{aggregate, AggregationSummary};
pub use consolidate::{consolidate, ConsolidationSummary};
pub use schema_mapper::{map_file, FileOutcome};
