//! Shared test utilities for the mcheck workspace
//!
//! [`MemoryCache`] is an in-process stand-in for a memcached server. It
//! follows the storage rules of the text protocol and can be told to
//! misbehave in specific ways through [`Behavior`]. Only available when the
//! "test-utils" feature is enabled.

use crate::client::{CacheClient, Connector, Item, Operation};
use crate::error::CacheError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Deviations from memcached semantics to inject.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Operations that always fail with a server error.
    pub failing: HashSet<Operation>,
    /// Bytes inserted between the old value and an appended suffix.
    pub append_delimiter: Option<Vec<u8>>,
    /// `add` overwrites existing keys instead of refusing them.
    pub add_overwrites: bool,
    /// TTLs are accepted but never enforced.
    pub ignore_ttl: bool,
    /// `get` returns a value different from the stored one.
    pub corrupt_reads: bool,
    /// Every n-th `set` call (counted across all handles) fails.
    pub fail_every_nth_set: Option<u64>,
    /// `Connector::connect` fails.
    pub refuse_connections: bool,
    /// `get_multi` returns only the first key it finds.
    pub get_multi_drops_keys: bool,
    /// `flush_all` succeeds without removing anything.
    pub flush_is_noop: bool,
}

impl Behavior {
    pub fn failing(ops: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            failing: ops.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Thread-safe in-memory cache. Clones share the same store, so a clone
/// acts like another connection to the same server.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    store: Arc<Mutex<HashMap<String, Entry>>>,
    behavior: Arc<Behavior>,
    ttl_unit: Duration,
    set_calls: Arc<AtomicU64>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// A well-behaved cache where one TTL unit is one second.
    pub fn new() -> Self {
        Self::with_behavior(Behavior::default())
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            behavior: Arc::new(behavior),
            ttl_unit: Duration::from_secs(1),
            set_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Scales TTLs so expiry can be observed in real time without
    /// waiting whole seconds.
    pub fn with_ttl_unit(mut self, unit: Duration) -> Self {
        self.ttl_unit = unit;
        self
    }

    /// Stores a value directly, bypassing injected faults.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        self.lock().insert(
            key.to_owned(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
    }

    /// Reads a value directly, bypassing injected faults.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let mut store = self.lock();
        Self::live(&mut store, key).map(|entry| entry.value.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, op: Operation) -> Result<(), CacheError> {
        if self.behavior.failing.contains(&op) {
            return Err(CacheError::Server(format!("injected {op} failure")));
        }
        Ok(())
    }

    fn expiry(&self, ttl: u32) -> Option<Instant> {
        if ttl == 0 || self.behavior.ignore_ttl {
            None
        } else {
            Some(Instant::now() + self.ttl_unit * ttl)
        }
    }

    /// Returns the entry for `key`, evicting it first if it has expired.
    fn live<'a>(store: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let expired = store
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| Instant::now() >= at);
        if expired {
            store.remove(key);
        }
        store.get_mut(key)
    }

    fn put(&self, store: &mut HashMap<String, Entry>, item: &Item) {
        store.insert(
            item.key.clone(),
            Entry {
                value: item.value.clone(),
                expires_at: self.expiry(item.expiration()),
            },
        );
    }

    fn adjust(&self, key: &str, apply: impl FnOnce(u64) -> u64) -> Result<u64, CacheError> {
        let mut store = self.lock();
        let entry = Self::live(&mut store, key).ok_or(CacheError::CacheMiss)?;
        let current = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                CacheError::Server("cannot increment or decrement non-numeric value".to_owned())
            })?;
        let next = apply(current);
        entry.value = next.to_string().into_bytes();
        Ok(next)
    }
}

impl CacheClient for MemoryCache {
    fn ping(&self) -> Result<(), CacheError> {
        self.check(Operation::Ping)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.check(Operation::Get)?;
        let mut store = self.lock();
        let mut value = Self::live(&mut store, key)
            .map(|entry| entry.value.clone())
            .ok_or(CacheError::CacheMiss)?;
        if self.behavior.corrupt_reads {
            value.push(b'!');
        }
        Ok(value)
    }

    fn set(&self, item: &Item) -> Result<(), CacheError> {
        self.check(Operation::Set)?;
        let call = self.set_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.behavior.fail_every_nth_set {
            if n > 0 && call % n == 0 {
                return Err(CacheError::Server(format!("injected failure on set #{call}")));
            }
        }
        let mut store = self.lock();
        self.put(&mut store, item);
        Ok(())
    }

    fn add(&self, item: &Item) -> Result<(), CacheError> {
        self.check(Operation::Add)?;
        let mut store = self.lock();
        if Self::live(&mut store, &item.key).is_some() && !self.behavior.add_overwrites {
            return Err(CacheError::NotStored);
        }
        self.put(&mut store, item);
        Ok(())
    }

    fn replace(&self, item: &Item) -> Result<(), CacheError> {
        self.check(Operation::Replace)?;
        let mut store = self.lock();
        if Self::live(&mut store, &item.key).is_none() {
            return Err(CacheError::NotStored);
        }
        self.put(&mut store, item);
        Ok(())
    }

    fn append(&self, key: &str, suffix: &[u8]) -> Result<(), CacheError> {
        self.check(Operation::Append)?;
        let mut store = self.lock();
        let entry = Self::live(&mut store, key).ok_or(CacheError::NotStored)?;
        if let Some(delimiter) = &self.behavior.append_delimiter {
            entry.value.extend_from_slice(delimiter);
        }
        entry.value.extend_from_slice(suffix);
        Ok(())
    }

    fn prepend(&self, key: &str, prefix: &[u8]) -> Result<(), CacheError> {
        self.check(Operation::Prepend)?;
        let mut store = self.lock();
        let entry = Self::live(&mut store, key).ok_or(CacheError::NotStored)?;
        let mut value = prefix.to_vec();
        value.extend_from_slice(&entry.value);
        entry.value = value;
        Ok(())
    }

    fn increment(&self, key: &str, delta: u64) -> Result<u64, CacheError> {
        self.check(Operation::Increment)?;
        self.adjust(key, |current| current.wrapping_add(delta))
    }

    fn decrement(&self, key: &str, delta: u64) -> Result<u64, CacheError> {
        self.check(Operation::Decrement)?;
        // memcached clamps decrements at zero
        self.adjust(key, |current| current.saturating_sub(delta))
    }

    fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError> {
        self.check(Operation::Touch)?;
        let expires_at = self.expiry(ttl);
        let mut store = self.lock();
        let entry = Self::live(&mut store, key).ok_or(CacheError::CacheMiss)?;
        entry.expires_at = expires_at;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check(Operation::Delete)?;
        let mut store = self.lock();
        Self::live(&mut store, key).ok_or(CacheError::CacheMiss)?;
        store.remove(key);
        Ok(())
    }

    fn flush_all(&self) -> Result<(), CacheError> {
        self.check(Operation::FlushAll)?;
        if !self.behavior.flush_is_noop {
            self.lock().clear();
        }
        Ok(())
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        self.check(Operation::GetMulti)?;
        let mut store = self.lock();
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = Self::live(&mut store, key) {
                found.insert((*key).to_owned(), entry.value.clone());
                if self.behavior.get_multi_drops_keys {
                    break;
                }
            }
        }
        Ok(found)
    }
}

impl Connector for MemoryCache {
    type Client = MemoryCache;

    fn connect(&self) -> Result<Self::Client, CacheError> {
        if self.behavior.refuse_connections {
            return Err(CacheError::Connection("connection refused".to_owned()));
        }
        Ok(self.clone())
    }

    fn target(&self) -> String {
        "memory".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_does_not_overwrite() {
        let cache = MemoryCache::new();
        cache.set(&Item::new("k", "original")).unwrap();

        assert_eq!(cache.add(&Item::new("k", "other")), Err(CacheError::NotStored));
        assert_eq!(cache.get("k").unwrap(), b"original");
    }

    #[test]
    fn test_replace_requires_existing_key() {
        let cache = MemoryCache::new();
        assert_eq!(cache.replace(&Item::new("k", "v")), Err(CacheError::NotStored));
        assert_eq!(cache.get("k"), Err(CacheError::CacheMiss));
    }

    #[test]
    fn test_append_and_prepend_concatenate() {
        let cache = MemoryCache::new();
        cache.set(&Item::new("k", "value")).unwrap();
        cache.append("k", b"_tail").unwrap();
        cache.prepend("k", b"head_").unwrap();
        assert_eq!(cache.get("k").unwrap(), b"head_value_tail");
    }

    #[test]
    fn test_append_delimiter_fault() {
        let cache = MemoryCache::with_behavior(Behavior {
            append_delimiter: Some(b" ".to_vec()),
            ..Behavior::default()
        });
        cache.set(&Item::new("k", "a")).unwrap();
        cache.append("k", b"b").unwrap();
        assert_eq!(cache.get("k").unwrap(), b"a b");
    }

    #[test]
    fn test_numeric_round_trip() {
        let cache = MemoryCache::new();
        cache.set(&Item::new("n", "1")).unwrap();
        assert_eq!(cache.increment("n", 1).unwrap(), 2);
        assert_eq!(cache.get("n").unwrap(), b"2");
        assert_eq!(cache.decrement("n", 5).unwrap(), 0);
        assert!(cache.increment("missing", 1).unwrap_err().is_miss());
    }

    #[test]
    fn test_increment_non_numeric_fails() {
        let cache = MemoryCache::new();
        cache.set(&Item::new("n", "abc")).unwrap();
        assert!(matches!(cache.increment("n", 1), Err(CacheError::Server(_))));
    }

    #[test]
    fn test_ttl_expires_in_real_time() {
        let cache = MemoryCache::new().with_ttl_unit(Duration::from_millis(10));
        cache.set(&Item::with_ttl("k", "v", 2)).unwrap();
        assert_eq!(cache.get("k").unwrap(), b"v");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), Err(CacheError::CacheMiss));
    }

    #[test]
    fn test_touch_resets_expiry() {
        let cache = MemoryCache::new().with_ttl_unit(Duration::from_millis(10));
        cache.set(&Item::new("k", "v")).unwrap();
        cache.touch("k", 2).unwrap();

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.peek("k").is_none());
        assert_eq!(cache.touch("k", 2), Err(CacheError::CacheMiss));
    }

    #[test]
    fn test_flush_clears_get_and_get_multi() {
        let cache = MemoryCache::new();
        cache.set(&Item::new("a", "1")).unwrap();
        cache.set(&Item::new("b", "2")).unwrap();
        assert_eq!(cache.get_multi(&["a", "b", "c"]).unwrap().len(), 2);

        cache.flush_all().unwrap();
        assert!(cache.get_multi(&["a", "b"]).unwrap().is_empty());
        assert!(cache.get("a").unwrap_err().is_miss());
    }

    #[test]
    fn test_every_nth_set_fails_across_clones() {
        let cache = MemoryCache::with_behavior(Behavior {
            fail_every_nth_set: Some(2),
            ..Behavior::default()
        });
        let other = cache.clone();

        assert!(cache.set(&Item::new("a", "1")).is_ok());
        assert!(other.set(&Item::new("b", "1")).is_err());
        assert!(cache.set(&Item::new("c", "1")).is_ok());
        assert_eq!(cache.set_calls(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_injected_failures() {
        let cache = MemoryCache::with_behavior(Behavior::failing([Operation::Ping]));
        assert!(matches!(cache.ping(), Err(CacheError::Server(_))));
        assert!(cache.flush_all().is_ok());
    }
}
