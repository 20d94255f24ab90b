//! Error types for lookflux

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse table payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Join integrity error: {0}")]
    JoinIntegrity(#[from] JoinIntegrityError),

    #[error("Unknown condition code '{code}' on trial type {trial_type_id}")]
    UnknownCondition { code: String, trial_type_id: u64 },

    #[error("Irregular time grid: row {row} has t_norm {t_norm}, not a multiple of {step_ms} ms")]
    IrregularTimeGrid { row: usize, t_norm: i64, step_ms: i64 },

    #[error("Invalid time window: start {start} is after end {end}")]
    InvalidWindow { start: i64, end: i64 },

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// A gaze sample or trial that does not resolve to exactly one parent row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinIntegrityError {
    #[error("{table} has no row with {key} = {id} (referenced by {referrer} row {row})")]
    MissingParent {
        table: &'static str,
        key: &'static str,
        id: u64,
        referrer: &'static str,
        row: usize,
    },

    #[error("{table} has {count} rows with {key} = {id}")]
    DuplicateKey {
        table: &'static str,
        key: &'static str,
        id: u64,
        count: usize,
    },

    #[error(
        "sample row {row} references administration {sample_administration_id} \
         but trial {trial_id} belongs to administration {trial_administration_id}"
    )]
    AdministrationMismatch {
        row: usize,
        trial_id: u64,
        sample_administration_id: u64,
        trial_administration_id: u64,
    },

    #[error(
        "sample row {row} declares trial type {sample_trial_type_id} \
         but trial {trial_id} has trial type {trial_trial_type_id}"
    )]
    TrialTypeMismatch {
        row: usize,
        trial_id: u64,
        sample_trial_type_id: u64,
        trial_trial_type_id: u64,
    },
}
