//! Client capability interface
//!
//! The checker and the benchmark only ever talk to a server through
//! [`CacheClient`]. The wire protocol lives behind an implementation of this
//! trait, which keeps both subsystems testable against an in-memory fake.

use std::collections::HashMap;
use std::fmt;

use crate::error::CacheError;

/// Every operation a memcached-compatible client exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ping,
    Get,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Increment,
    Decrement,
    Touch,
    Delete,
    FlushAll,
    GetMulti,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Ping => "ping",
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Add => "add",
            Operation::Replace => "replace",
            Operation::Append => "append",
            Operation::Prepend => "prepend",
            Operation::Increment => "incr",
            Operation::Decrement => "decr",
            Operation::Touch => "touch",
            Operation::Delete => "delete",
            Operation::FlushAll => "flush_all",
            Operation::GetMulti => "get_multi",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A key/value pair as sent to the server.
///
/// `ttl` is in seconds; `None` means the item never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Option<u32>,
}

impl Item {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(key: impl Into<String>, value: impl Into<Vec<u8>>, ttl: u32) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: Some(ttl),
        }
    }

    /// Expiration as memcached encodes it (0 = never).
    pub fn expiration(&self) -> u32 {
        self.ttl.unwrap_or(0)
    }
}

/// Operations consumed by the checker and the benchmark.
///
/// All calls block until the server answers. A missing key is reported as
/// [`CacheError::CacheMiss`] by `get`, `touch` and `delete`.
pub trait CacheClient: Send {
    fn ping(&self) -> Result<(), CacheError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    fn set(&self, item: &Item) -> Result<(), CacheError>;

    /// Stores the item only if the key is absent.
    fn add(&self, item: &Item) -> Result<(), CacheError>;

    /// Stores the item only if the key is present.
    fn replace(&self, item: &Item) -> Result<(), CacheError>;

    fn append(&self, key: &str, suffix: &[u8]) -> Result<(), CacheError>;

    fn prepend(&self, key: &str, prefix: &[u8]) -> Result<(), CacheError>;

    fn increment(&self, key: &str, delta: u64) -> Result<u64, CacheError>;

    fn decrement(&self, key: &str, delta: u64) -> Result<u64, CacheError>;

    fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn flush_all(&self) -> Result<(), CacheError>;

    /// Returns only the keys that are present.
    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>, CacheError>;
}

/// Opens dedicated client connections.
///
/// Every call returns a fresh client that the caller owns exclusively.
pub trait Connector: Send + Sync {
    type Client: CacheClient + 'static;

    fn connect(&self) -> Result<Self::Client, CacheError>;

    /// Human readable target, used in log lines.
    fn target(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_expiration() {
        assert_eq!(Item::new("k", "v").expiration(), 0);
        assert_eq!(Item::with_ttl("k", "v", 2).expiration(), 2);
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::FlushAll.to_string(), "flush_all");
        assert_eq!(Operation::Increment.to_string(), "incr");
    }
}
