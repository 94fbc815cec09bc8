use crate::error::{McheckError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest relative expiration memcached accepts. Anything above is read
/// as an absolute unix timestamp.
pub const MAX_RELATIVE_TTL: u32 = 60 * 60 * 24 * 30;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Socket read/write timeout. None leaves the client default.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub flush: bool,
    #[serde(default = "default_expiry_ttl")]
    pub expiry_ttl: u32,
    #[serde(default = "default_expiry_wait_ms")]
    pub expiry_wait_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_requests")]
    pub requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_secs: None,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            flush: false,
            expiry_ttl: default_expiry_ttl(),
            expiry_wait_ms: default_expiry_wait_ms(),
        }
    }
}

impl CheckConfig {
    pub fn expiry_wait(&self) -> Duration {
        Duration::from_millis(self.expiry_wait_ms)
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            requests: default_requests(),
        }
    }
}

// Default value functions
fn default_address() -> String {
    "127.0.0.1:11211".to_owned()
}

const fn default_expiry_ttl() -> u32 {
    2
}

const fn default_expiry_wait_ms() -> u64 {
    3000
}

const fn default_concurrency() -> usize {
    10
}

const fn default_requests() -> usize {
    10000
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| McheckError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| McheckError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    fn find_config_file() -> Result<PathBuf> {
        let candidates = [
            dirs::config_dir().map(|p| p.join("mcheck/mcheck.toml")),
            Some(PathBuf::from("/etc/mcheck/mcheck.toml")),
        ];

        for candidate in candidates.into_iter().flatten() {
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(McheckError::Config("Config file not found".to_owned()))
    }

    /// Checks the invariants command-line overrides must also respect.
    pub fn validate(&self) -> Result<()> {
        validate_address(&self.server.address)?;

        if self.benchmark.concurrency == 0 {
            return Err(McheckError::Config(
                "concurrency must be positive".to_owned(),
            ));
        }
        if self.benchmark.requests == 0 {
            return Err(McheckError::Config(
                "requests per worker must be positive".to_owned(),
            ));
        }
        if self.check.expiry_ttl == 0 || self.check.expiry_ttl > MAX_RELATIVE_TTL {
            return Err(McheckError::Config(format!(
                "expiry TTL must be between 1 and {} seconds, got {}",
                MAX_RELATIVE_TTL, self.check.expiry_ttl
            )));
        }
        if self.check.expiry_wait_ms < u64::from(self.check.expiry_ttl) * 1000 {
            return Err(McheckError::Config(format!(
                "expiry wait of {}ms is shorter than the {}s TTL",
                self.check.expiry_wait_ms, self.check.expiry_ttl
            )));
        }
        Ok(())
    }
}

fn validate_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| McheckError::Config(format!("Address must be host:port: {}", address)))?;

    if host.is_empty() {
        return Err(McheckError::Config(format!("Missing host in address: {}", address)));
    }
    port.parse::<u16>()
        .map_err(|_| McheckError::Config(format!("Invalid port in address: {}", address)))?;
    Ok(())
}
