//! Service configuration
//!
//! Loaded once from a TOML file at startup and handed to the supervisor.
//! Connection parameters for the coordination service and the long-term
//! store are passed through to their clients untouched.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigStoreError, ConfigStoreResult};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigStoreConfig {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
    pub web: WebConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    pub lts: LtsConfig,
    #[serde(default)]
    pub wal: WalConfig,
    #[serde(default)]
    pub readdb: ReadDbConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    pub listen_address: String,
    /// Serve over TLS only
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub tls_cert_file: String,
    #[serde(default)]
    pub tls_key_file: String,
}

impl WebConfig {
    /// Plain HTTP listener on the given address
    pub fn plain(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
            tls: false,
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
        }
    }

    /// Parse the listen address
    pub fn socket_addr(&self) -> ConfigStoreResult<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            ConfigStoreError::Config(format!(
                "invalid listen address {:?}: {}",
                self.listen_address, e
            ))
        })
    }
}

/// Coordination service connection parameters
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CoordinationConfig {
    /// In-process coordination, single node only
    Embedded,
    /// External coordination endpoints (`host:port`)
    Remote {
        endpoints: Vec<String>,
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self::Embedded
    }
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

/// Long-term store configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LtsConfig {
    /// Volatile in-memory store
    Memory,
    /// Files under a local directory
    Posix { path: PathBuf },
}

/// Log engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct WalConfig {
    /// Interval between coordination session keep-alives
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Coordination session time to live
    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_session_ttl_ms() -> u64 {
    10_000
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            session_ttl_ms: default_session_ttl_ms(),
        }
    }
}

impl WalConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }
}

/// Read model tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ReadDbConfig {
    /// Upper bound on how long the read model may lag the log
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

fn default_sync_interval_ms() -> u64 {
    500
}

impl Default for ReadDbConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

impl ReadDbConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

impl ConfigStoreConfig {
    /// In-memory, embedded configuration listening on `listen_address`
    pub fn in_memory(listen_address: impl Into<String>) -> Self {
        Self {
            debug: false,
            web: WebConfig::plain(listen_address),
            coordination: CoordinationConfig::Embedded,
            lts: LtsConfig::Memory,
            wal: WalConfig::default(),
            readdb: ReadDbConfig::default(),
        }
    }

    /// Load and validate a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigStoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigStoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ConfigStoreResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigStoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> ConfigStoreResult<()> {
        self.web.socket_addr()?;

        if self.web.tls {
            if self.web.tls_cert_file.is_empty() {
                return Err(ConfigStoreError::Config(
                    "tls enabled but tls_cert_file is empty".to_string(),
                ));
            }
            if self.web.tls_key_file.is_empty() {
                return Err(ConfigStoreError::Config(
                    "tls enabled but tls_key_file is empty".to_string(),
                ));
            }
        }

        if let CoordinationConfig::Remote { endpoints, .. } = &self.coordination {
            if endpoints.is_empty() {
                return Err(ConfigStoreError::Config(
                    "remote coordination requires at least one endpoint".to_string(),
                ));
            }
        }

        if let LtsConfig::Posix { path } = &self.lts {
            if path.as_os_str().is_empty() {
                return Err(ConfigStoreError::Config(
                    "posix lts requires a non-empty path".to_string(),
                ));
            }
        }

        if self.wal.heartbeat_interval_ms == 0 || self.readdb.sync_interval_ms == 0 {
            return Err(ConfigStoreError::Config(
                "heartbeat and sync intervals must be greater than zero".to_string(),
            ));
        }
        if self.wal.session_ttl_ms <= self.wal.heartbeat_interval_ms {
            return Err(ConfigStoreError::Config(
                "wal session ttl must be longer than the heartbeat interval".to_string(),
            ));
        }

        Ok(())
    }
}
