//! Common fixtures for checker and benchmark tests

#![allow(dead_code)]

use mcheck_core::test_utils::{Behavior, MemoryCache};
use mcheck_runner::CheckOptions;
use std::time::Duration;

/// Length of one TTL "second" in the fake cache.
pub const TTL_UNIT: Duration = Duration::from_millis(20);

/// Options whose expiry wait comfortably outlasts a 2-unit TTL.
pub fn fast_options(flush: bool) -> CheckOptions {
    CheckOptions {
        flush,
        expiry_ttl: 2,
        expiry_wait: TTL_UNIT * 3,
    }
}

/// A compliant cache with scaled TTLs.
pub fn compliant_cache() -> MemoryCache {
    MemoryCache::new().with_ttl_unit(TTL_UNIT)
}

pub fn faulty_cache(behavior: Behavior) -> MemoryCache {
    MemoryCache::with_behavior(behavior).with_ttl_unit(TTL_UNIT)
}
