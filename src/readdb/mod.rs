//! Read model: queryable projection of the WAL
//!
//! The run-loop applies new entries whenever the WAL reports a commit, and
//! at least once per `sync_interval`, which bounds how far queries can lag
//! behind acknowledged writes. Queries never touch the WAL.

mod projection;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ReadDbConfig;
use crate::error::BoxError;
use crate::supervisor::Subsystem;
use crate::types::{Project, RemoteSource, User};
use crate::wal::{WalError, WalManager};

use projection::Projection;

/// Default page size for list queries
pub const DEFAULT_LIST_LIMIT: usize = 10;
/// Largest page size a list query may request
pub const MAX_LIST_LIMIT: usize = 100;

/// Errors that can occur while projecting the WAL
#[derive(Debug, Error)]
pub enum ReadDbError {
    #[error("wal: {0}")]
    Wal(#[from] WalError),

    #[error("cannot decode wal entry {sequence}: {source}")]
    Decode {
        sequence: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("wal entry {sequence} puts record {id} without data")]
    MissingData { sequence: u64, id: String },

    #[error("wal entry out of order: expected {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("wal commit notifications closed")]
    WalClosed,
}

/// Result type for read model operations
pub type ReadDbResult<T> = Result<T, ReadDbError>;

/// Paging parameters for list queries
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    /// Exclusive name cursor
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Ascending name order (default: true)
    #[serde(default = "default_asc")]
    pub asc: bool,
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_asc() -> bool {
    true
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            start: None,
            limit: DEFAULT_LIST_LIMIT,
            asc: true,
        }
    }
}

impl ListParams {
    /// Clamp limit to `1..=MAX_LIST_LIMIT`
    pub fn normalized_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIST_LIMIT)
    }
}

/// One page of a list query
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of records of this kind
    pub total: usize,
}

/// A query answer and the WAL sequence it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub sequence: u64,
}

/// Materialized view over the WAL
#[derive(Debug)]
pub struct ReadDb {
    wal: Arc<WalManager>,
    config: ReadDbConfig,
    state: RwLock<Projection>,
    /// Only one sync applies entries at a time
    sync_lock: Mutex<()>,
}

impl ReadDb {
    pub fn new(wal: Arc<WalManager>, config: ReadDbConfig) -> Self {
        Self {
            wal,
            config,
            state: RwLock::new(Projection::default()),
            sync_lock: Mutex::new(()),
        }
    }

    /// Sequence of the last applied WAL entry
    pub fn applied_sequence(&self) -> u64 {
        self.state.read().applied
    }

    /// Apply every committed entry not yet in the projection
    pub async fn sync(&self) -> ReadDbResult<u64> {
        let _guard = self.sync_lock.lock().await;
        let from = self.applied_sequence();
        let entries = self.wal.entries_after(from).await?;
        if entries.is_empty() {
            return Ok(from);
        }

        let mut state = self.state.write();
        state.apply(&entries)?;
        tracing::debug!(from, to = state.applied, "readdb synced");
        Ok(state.applied)
    }

    /// Follow the WAL until cancelled
    pub async fn run(&self, cancel: CancellationToken) -> ReadDbResult<()> {
        let mut committed = self.wal.subscribe();
        let mut ticker = tokio::time::interval(self.config.sync_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let applied = self.sync().await?;
        tracing::info!(applied, "readdb initial sync done");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("readdb exiting");
                    return Ok(());
                }

                changed = committed.changed() => {
                    if changed.is_err() {
                        return Err(ReadDbError::WalClosed);
                    }
                    self.sync().await?;
                }

                _ = ticker.tick() => {
                    self.sync().await?;
                }
            }
        }
    }

    /// Answer a lookup and its sequence under one read guard
    fn query<T>(&self, f: impl FnOnce(&Projection) -> T) -> Versioned<T> {
        let state = self.state.read();
        Versioned {
            value: f(&state),
            sequence: state.applied,
        }
    }

    pub async fn project(&self, id: &str) -> Versioned<Option<Project>> {
        self.query(|state| state.projects.get(id).cloned())
    }

    pub async fn project_by_name(&self, name: &str) -> Versioned<Option<Project>> {
        self.query(|state| state.projects.get_by_name(name).cloned())
    }

    pub async fn projects(&self, params: &ListParams) -> Versioned<Page<Project>> {
        self.query(|state| state.projects.page(params))
    }

    pub async fn user(&self, id: &str) -> Versioned<Option<User>> {
        self.query(|state| state.users.get(id).cloned())
    }

    pub async fn user_by_name(&self, name: &str) -> Versioned<Option<User>> {
        self.query(|state| state.users.get_by_name(name).cloned())
    }

    pub async fn users(&self, params: &ListParams) -> Versioned<Page<User>> {
        self.query(|state| state.users.page(params))
    }

    /// User owning the token value
    pub async fn user_by_token(&self, token: &str) -> Versioned<Option<User>> {
        self.query(|state| {
            state
                .users
                .values()
                .find(|user| user.tokens.values().any(|value| value == token))
                .cloned()
        })
    }

    /// User owning the linked account
    pub async fn user_by_linked_account(&self, linked_account_id: &str) -> Versioned<Option<User>> {
        self.query(|state| {
            state
                .users
                .values()
                .find(|user| user.linked_accounts.contains_key(linked_account_id))
                .cloned()
        })
    }

    /// User with a linked account for the remote user on the remote source
    pub async fn user_by_remote_user(
        &self,
        remote_user_id: &str,
        remote_source_id: &str,
    ) -> Versioned<Option<User>> {
        self.query(|state| {
            state
                .users
                .values()
                .find(|user| {
                    user.linked_accounts.values().any(|la| {
                        la.remote_user_id == remote_user_id
                            && la.remote_source_id == remote_source_id
                    })
                })
                .cloned()
        })
    }

    pub async fn remote_source(&self, id: &str) -> Versioned<Option<RemoteSource>> {
        self.query(|state| state.remote_sources.get(id).cloned())
    }

    pub async fn remote_source_by_name(&self, name: &str) -> Versioned<Option<RemoteSource>> {
        self.query(|state| state.remote_sources.get_by_name(name).cloned())
    }

    pub async fn remote_sources(&self, params: &ListParams) -> Versioned<Page<RemoteSource>> {
        self.query(|state| state.remote_sources.page(params))
    }
}

#[async_trait]
impl Subsystem for ReadDb {
    fn name(&self) -> &'static str {
        "readdb"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), BoxError> {
        ReadDb::run(self, cancel).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::WalConfig;
    use crate::coordination::EmbeddedCoordination;
    use crate::objectstorage::MemoryStorage;
    use crate::types::LinkedAccount;
    use crate::wal::{Action, DataType};

    async fn setup(sync_interval_ms: u64) -> (Arc<WalManager>, ReadDb) {
        let wal = Arc::new(
            WalManager::new(
                Arc::new(EmbeddedCoordination::new()),
                Arc::new(MemoryStorage::new()),
                WalConfig::default(),
            )
            .await
            .unwrap(),
        );
        let readdb = ReadDb::new(wal.clone(), ReadDbConfig { sync_interval_ms });
        (wal, readdb)
    }

    #[tokio::test]
    async fn test_queries_lag_until_sync() {
        let (wal, readdb) = setup(500).await;
        let project = Project::new("p1".to_string(), "demo".to_string());
        wal.append(vec![Action::put(DataType::Project, "p1", &project).unwrap()])
            .await
            .unwrap();

        assert!(readdb.project_by_name("demo").await.value.is_none());
        assert_eq!(readdb.sync().await.unwrap(), 1);
        let found = readdb.project_by_name("demo").await;
        assert_eq!(found.value, Some(project.clone()));
        assert_eq!(found.sequence, 1);
        assert_eq!(readdb.project("p1").await.value, Some(project));
        assert_eq!(readdb.applied_sequence(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lookup_and_sequence_agree() {
        let (wal, readdb) = setup(500).await;
        let readdb = Arc::new(readdb);
        let writer = {
            let readdb = readdb.clone();
            tokio::spawn(async move {
                for i in 1..=100u64 {
                    let project = Project::new(format!("id{}", i), format!("p{}", i));
                    wal.append(vec![Action::put(DataType::Project, &project.id, &project).unwrap()])
                        .await
                        .unwrap();
                    readdb.sync().await.unwrap();
                }
            })
        };

        // project p{i} is committed at sequence i
        while !writer.is_finished() {
            for i in [1u64, 25, 50, 75, 100] {
                let found = readdb.project_by_name(&format!("p{}", i)).await;
                assert_eq!(
                    found.value.is_some(),
                    found.sequence >= i,
                    "p{} read at {}",
                    i,
                    found.sequence
                );
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(readdb.projects(&ListParams::default()).await.sequence, 100);
    }

    #[tokio::test]
    async fn test_run_follows_commits() {
        let (wal, readdb) = setup(50).await;
        let readdb = Arc::new(readdb);
        let cancel = CancellationToken::new();
        let runner = {
            let readdb = readdb.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { readdb.run(cancel).await })
        };

        let user = User::new("u1".to_string(), "alice".to_string());
        wal.append(vec![Action::put(DataType::User, "u1", &user).unwrap()])
            .await
            .unwrap();

        let mut found = None;
        for _ in 0..50 {
            found = readdb.user_by_name("alice").await.value;
            if found.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(found, Some(user));

        cancel.cancel();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_user_lookups() {
        let (wal, readdb) = setup(500).await;
        let mut user = User::new("u1".to_string(), "alice".to_string());
        user.tokens.insert("ci".to_string(), "tok-123".to_string());
        user.linked_accounts.insert(
            "la1".to_string(),
            LinkedAccount {
                id: "la1".to_string(),
                remote_source_id: "rs1".to_string(),
                remote_user_id: "42".to_string(),
                remote_user_name: "alice-gh".to_string(),
                user_access_token: String::new(),
                oauth2_access_token: String::new(),
                oauth2_refresh_token: String::new(),
            },
        );
        wal.append(vec![Action::put(DataType::User, "u1", &user).unwrap()])
            .await
            .unwrap();
        readdb.sync().await.unwrap();

        assert_eq!(readdb.user_by_token("tok-123").await.value.unwrap().id, "u1");
        assert!(readdb.user_by_token("nope").await.value.is_none());
        assert_eq!(readdb.user_by_linked_account("la1").await.value.unwrap().id, "u1");
        assert_eq!(readdb.user_by_remote_user("42", "rs1").await.value.unwrap().id, "u1");
        assert!(readdb.user_by_remote_user("42", "rs2").await.value.is_none());
    }

    #[test]
    fn test_list_limit_is_clamped() {
        let params = ListParams {
            start: None,
            limit: 5000,
            asc: true,
        };
        assert_eq!(params.normalized_limit(), MAX_LIST_LIMIT);
        let zero = ListParams {
            limit: 0,
            ..ListParams::default()
        };
        assert_eq!(zero.normalized_limit(), 1);
    }
}
