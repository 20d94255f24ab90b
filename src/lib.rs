//! lookflux - Looking-while-listening accuracy curves from eye-tracking tables
//!
//! lookflux turns the four upstream tables of an infant eye-tracking dataset
//! into per-condition accuracy curves through a deterministic pipeline:
//! table join → condition normalization → per-unit accuracy → across-unit
//! mean and 95% interval → optional window summary.
//!
//! ## Modules
//!
//! - **Schema**: typed table rows, JSON/NDJSON parsing, and the `TableSource` seam
//! - **Pipeline**: stateless entry points and the stateful `LookingTimeProcessor`
//! - **FFI**: C ABI over the processor

pub mod accuracy;
pub mod aggregate;
pub mod config;
pub mod encoder;
pub mod error;
pub mod join;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod types;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregate::{Aggregation, TwoStageAggregator};
pub use config::{AnalysisConfig, ConditionCodes};
pub use encoder::{SummaryEncoder, OUTPUT_SCHEMA_VERSION};
pub use error::{ComputeError, JoinIntegrityError};
pub use pipeline::{
    run_dataset, run_pipeline, tables_to_summary_json, validate_tables, LookingTimeProcessor,
    PipelineOutput, ValidationReport,
};

// Schema exports
pub use schema::{DirectoryTableSource, TableSource, Tables, TABLES_SCHEMA_VERSION};

/// Version embedded in all summary payloads
pub const LOOKFLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for summary payloads
pub const PRODUCER_NAME: &str = "lookflux";
