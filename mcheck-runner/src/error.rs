use mcheck_core::{CacheError, Operation};
use thiserror::Error;

/// First failure of a conformance run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("server unreachable: {0}")]
    Connectivity(CacheError),

    #[error("{step}: {op} failed: {source}")]
    Operation {
        step: &'static str,
        op: Operation,
        #[source]
        source: CacheError,
    },

    #[error("{step}: expected `{expected}` for `{key}`, got `{actual}`")]
    ValueMismatch {
        step: &'static str,
        key: String,
        expected: String,
        actual: String,
    },

    #[error("{step}: expected {expected} items, got {actual}")]
    EntryCount {
        step: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{step}: expected a cache miss for `{key}`, but it is still stored")]
    UnexpectedHit { step: &'static str, key: String },
}

impl CheckError {
    /// Name of the step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            CheckError::Connectivity(_) => "Ping",
            CheckError::Operation { step, .. }
            | CheckError::ValueMismatch { step, .. }
            | CheckError::EntryCount { step, .. }
            | CheckError::UnexpectedHit { step, .. } => step,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkError {
    #[error("Invalid benchmark parameters: {0}")]
    InvalidParams(String),

    #[error("no benchmark iteration completed successfully")]
    EmptyResult,
}
