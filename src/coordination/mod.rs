//! Coordination client used by the WAL for single-writer arbitration
//!
//! The WAL holds a session with a time to live and a lock on the writer key.
//! Losing the session means another node may take over the log, so the WAL
//! stops accepting appends and its run-loop terminates.
//!
//! - `EmbeddedCoordination`: in-process sessions and locks
//! - `RemoteCoordination`: endpoint-backed client, probes reachability

mod embedded;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CoordinationConfig;

pub use embedded::EmbeddedCoordination;
pub use remote::RemoteCoordination;

/// Errors returned by coordination clients
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("no coordination endpoint reachable ({endpoints}): {reason}")]
    Unreachable { endpoints: String, reason: String },

    #[error("session {0} expired")]
    SessionExpired(String),

    #[error("lock {key} is not held by session {session}")]
    NotLockOwner { key: String, session: String },
}

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// A lease-backed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub owner: String,
    pub ttl: Duration,
}

/// Distributed locking primitives
#[async_trait]
pub trait CoordinationClient: Send + Sync + std::fmt::Debug {
    /// Open a session that expires unless kept alive within `ttl`
    async fn open_session(&self, owner: &str, ttl: Duration) -> CoordinationResult<Session>;

    /// Renew the session lease
    async fn keep_alive(&self, session: &Session) -> CoordinationResult<()>;

    /// Take `key` for the session; `false` when another live session holds it
    async fn try_lock(&self, key: &str, session: &Session) -> CoordinationResult<bool>;

    /// Release `key`
    async fn unlock(&self, key: &str, session: &Session) -> CoordinationResult<()>;

    /// Close the session and release all its locks
    async fn close_session(&self, session: &Session) -> CoordinationResult<()>;
}

/// Resolve the coordination client described by the configuration
pub async fn connect(config: &CoordinationConfig) -> CoordinationResult<Arc<dyn CoordinationClient>> {
    match config {
        CoordinationConfig::Embedded => Ok(Arc::new(EmbeddedCoordination::new())),
        CoordinationConfig::Remote {
            endpoints,
            connect_timeout_ms,
        } => {
            let client = RemoteCoordination::connect(
                endpoints.clone(),
                Duration::from_millis(*connect_timeout_ms),
            )
            .await?;
            Ok(Arc::new(client))
        }
    }
}
