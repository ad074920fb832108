//! Configstore
//!
//! Orchestration layer of a configuration store for projects, users, linked
//! accounts, user tokens and remote sources. Writes go through a
//! write-ahead log persisted in a long-term object store; reads are served
//! from a locally projected read model.
//!
//! # Modules
//!
//! - `supervisor`: construction order, concurrent run-loops, first-terminal-outcome shutdown
//! - `api`: CQRS gateway (declarative route table, CORS, optional TLS listener)
//! - `command`: serialized command executor on top of the WAL
//! - `readdb`: read model projected from the WAL
//! - `wal`: single-writer append-only log
//! - `coordination`: sessions and locks (embedded or remote)
//! - `objectstorage`: long-term store (memory or posix)
//! - `types`: domain records
//! - `config`, `logging`, `error`: ambient plumbing
//!
//! # Example
//!
//! ```no_run
//! use configstore::config::ConfigStoreConfig;
//! use configstore::supervisor;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> configstore::ConfigStoreResult<()> {
//!     let config = ConfigStoreConfig::in_memory("127.0.0.1:4002");
//!     let handles = supervisor::construct(&config).await?;
//!     supervisor::run(handles, CancellationToken::new()).await
//! }
//! ```

pub mod api;
pub mod command;
pub mod config;
pub mod coordination;
pub mod error;
pub mod logging;
pub mod objectstorage;
pub mod readdb;
pub mod supervisor;
pub mod types;
pub mod wal;

// Re-export commonly used items at crate root
pub use config::ConfigStoreConfig;
pub use error::{ConfigStoreError, ConfigStoreResult};
pub use supervisor::{construct, run, ServiceHandles, Subsystem};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
