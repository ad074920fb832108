//! Service-level errors
//!
//! Only construction failures and the terminal outcomes observed by the
//! supervisor end up here. Per-request failures stay in the gateway.

use thiserror::Error;

use crate::api::routes::RouteError;
use crate::coordination::CoordinationError;
use crate::objectstorage::StorageError;
use crate::readdb::ReadDbError;
use crate::wal::WalError;

/// Boxed error returned by a subsystem run-loop
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop the service from starting or keep it from running
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("coordination: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("long-term store: {0}")]
    Storage(#[from] StorageError),

    #[error("wal: {0}")]
    Wal(#[from] WalError),

    #[error("readdb: {0}")]
    ReadDb(#[from] ReadDbError),

    #[error("route table: {0}")]
    Route(#[from] RouteError),

    /// TLS material could not be loaded
    #[error("tls configuration (cert {cert_file}, key {key_file}): {source}")]
    Tls {
        cert_file: String,
        key_file: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP listener stopped (bind, accept or serve failure)
    #[error("http server listen error: {0}")]
    Listener(#[source] std::io::Error),

    /// A long-running subsystem returned an error
    #[error("subsystem {name} failed: {source}")]
    SubsystemFailed {
        name: &'static str,
        #[source]
        source: BoxError,
    },

    /// A long-running subsystem returned without error while it was expected to run
    #[error("subsystem {name} exited unexpectedly")]
    SubsystemExited { name: &'static str },
}

/// Result type for service-level operations
pub type ConfigStoreResult<T> = Result<T, ConfigStoreError>;
