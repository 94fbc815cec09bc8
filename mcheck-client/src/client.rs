//! memcached adapter
//!
//! Implements [`CacheClient`] on top of the `memcache` crate, forced onto
//! the text protocol with `protocol=ascii`. Each [`MemcacheClient`] owns
//! exactly one connection.
//!
//! In text mode the crate reports `NOT_STORED` from add, replace, append and
//! prepend as success. An Add or Replace that should have been refused is
//! therefore caught by the checker's follow-up Get, not by the call itself.

use mcheck_core::config::ServerConfig;
use mcheck_core::{CacheClient, CacheError, Connector, Item};
use memcache::{CommandError, MemcacheError};
use std::collections::HashMap;
use tracing::debug;

/// Builds dedicated connections to one server.
#[derive(Debug, Clone)]
pub struct MemcacheConnector {
    address: String,
    url: String,
}

impl MemcacheConnector {
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            address: server.address.clone(),
            url: connection_url(server),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for MemcacheConnector {
    type Client = MemcacheClient;

    fn connect(&self) -> Result<MemcacheClient, CacheError> {
        debug!("Connecting to {}", self.url);
        let inner = memcache::Client::connect(self.url.clone())
            .map_err(|e| CacheError::Connection(format!("{}: {}", self.address, e)))?;
        Ok(MemcacheClient { inner })
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}

fn connection_url(server: &ServerConfig) -> String {
    let mut url = format!("memcache://{}?protocol=ascii&tcp_nodelay=true", server.address);
    if let Some(timeout) = server.timeout_secs {
        url.push_str(&format!("&timeout={timeout}"));
    }
    url
}

fn map_error(e: MemcacheError) -> CacheError {
    match e {
        MemcacheError::IOError(_) | MemcacheError::PoolError(_) => {
            CacheError::Connection(e.to_string())
        }
        MemcacheError::CommandError(CommandError::KeyNotFound) => CacheError::CacheMiss,
        MemcacheError::CommandError(CommandError::KeyExists) => CacheError::NotStored,
        e => CacheError::Server(e.to_string()),
    }
}

pub struct MemcacheClient {
    inner: memcache::Client,
}

impl CacheClient for MemcacheClient {
    fn ping(&self) -> Result<(), CacheError> {
        // memcached has no ping command; `version` is the cheapest round trip
        self.inner
            .version()
            .map(|_| ())
            .map_err(|e| CacheError::Connection(e.to_string()))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.inner
            .get::<Vec<u8>>(key)
            .map_err(map_error)?
            .ok_or(CacheError::CacheMiss)
    }

    fn set(&self, item: &Item) -> Result<(), CacheError> {
        self.inner
            .set(&item.key, item.value.as_slice(), item.expiration())
            .map_err(map_error)
    }

    fn add(&self, item: &Item) -> Result<(), CacheError> {
        self.inner
            .add(&item.key, item.value.as_slice(), item.expiration())
            .map_err(map_error)
    }

    fn replace(&self, item: &Item) -> Result<(), CacheError> {
        self.inner
            .replace(&item.key, item.value.as_slice(), item.expiration())
            .map_err(map_error)
    }

    fn append(&self, key: &str, suffix: &[u8]) -> Result<(), CacheError> {
        self.inner.append(key, suffix).map_err(map_error)
    }

    fn prepend(&self, key: &str, prefix: &[u8]) -> Result<(), CacheError> {
        self.inner.prepend(key, prefix).map_err(map_error)
    }

    fn increment(&self, key: &str, delta: u64) -> Result<u64, CacheError> {
        self.inner.increment(key, delta).map_err(map_error)
    }

    fn decrement(&self, key: &str, delta: u64) -> Result<u64, CacheError> {
        self.inner.decrement(key, delta).map_err(map_error)
    }

    fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError> {
        match self.inner.touch(key, ttl).map_err(map_error)? {
            true => Ok(()),
            false => Err(CacheError::CacheMiss),
        }
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self.inner.delete(key).map_err(map_error)? {
            true => Ok(()),
            false => Err(CacheError::CacheMiss),
        }
    }

    fn flush_all(&self) -> Result<(), CacheError> {
        self.inner.flush().map_err(map_error)
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        self.inner.gets::<Vec<u8>>(keys).map_err(map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_timeout() {
        let server = ServerConfig {
            address: "127.0.0.1:11211".to_owned(),
            timeout_secs: None,
        };
        assert_eq!(
            connection_url(&server),
            "memcache://127.0.0.1:11211?protocol=ascii&tcp_nodelay=true"
        );
    }

    #[test]
    fn test_url_with_timeout() {
        let server = ServerConfig {
            address: "cache.local:11311".to_owned(),
            timeout_secs: Some(5),
        };
        let connector = MemcacheConnector::new(&server);
        assert_eq!(
            connector.url(),
            "memcache://cache.local:11311?protocol=ascii&tcp_nodelay=true&timeout=5"
        );
        assert_eq!(connector.target(), "cache.local:11311");
    }

    #[test]
    fn test_url_selects_text_protocol() {
        let connector = MemcacheConnector::new(&ServerConfig::default());
        let url = memcache::Url::parse(connector.url()).unwrap();
        assert!(
            url.query_pairs()
                .any(|(key, value)| key == "protocol" && value == "ascii")
        );
    }

    #[test]
    fn test_transport_errors_map_to_connection() {
        let e = MemcacheError::IOError(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(matches!(
            map_error(e),
            CacheError::Connection(msg) if msg.contains("reset by peer")
        ));
    }

    #[test]
    fn test_command_errors_map_to_cache_errors() {
        assert_eq!(
            map_error(MemcacheError::CommandError(CommandError::KeyNotFound)),
            CacheError::CacheMiss
        );
        assert_eq!(
            map_error(MemcacheError::CommandError(CommandError::KeyExists)),
            CacheError::NotStored
        );
        assert!(matches!(
            map_error(MemcacheError::CommandError(CommandError::ValueTooLarge)),
            CacheError::Server(_)
        ));
    }

    #[test]
    fn test_map_errors_stay_map_errors() {
        let e = MemcacheError::ServerError(memcache::ServerError::Error(
            "SERVER_ERROR out of memory".to_owned(),
        ));
        assert!(matches!(
            map_error(e),
            CacheError::Server(msg) if msg.contains("out of memory")
        ));
    }
}
