pub mod benchmark;
pub mod checker;
pub mod error;

pub use benchmark::{BenchmarkParams, BenchmarkSummary, OpLatency, OpStats};
pub use checker::{CheckOptions, CheckSummary, Checker};
pub use error::{BenchmarkError, CheckError};
