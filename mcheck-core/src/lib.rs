#![allow(clippy::cargo_common_metadata)]

pub mod client;
pub mod config;
pub mod error;
pub mod report;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use client::{CacheClient, Connector, Item, Operation};
pub use error::{CacheError, McheckError};
pub use report::{CheckResult, ConsoleReporter, MemoryReporter, Reporter};
