//! Write-ahead log (the log engine)
//!
//! ```text
//! Write Path:
//! ┌────────────────┐    ┌─────────────────┐    ┌───────────────────┐    ┌──────────────┐
//! │ CommandHandler │───►│ append(actions) │───►│ lts.put(wal/seq)  │───►│ notify readdb│
//! └────────────────┘    └─────────────────┘    │ durable on return │    └──────────────┘
//!                                              └───────────────────┘
//! ```
//!
//! The manager is the single writer of the log: it holds a coordination
//! session and the writer lock for its whole lifetime. `run` keeps the
//! session alive and terminates when it is lost or on cancellation.

mod entry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::WalConfig;
use crate::coordination::{CoordinationClient, CoordinationError, Session};
use crate::error::BoxError;
use crate::objectstorage::{ObjectStorage, StorageError};
use crate::supervisor::Subsystem;

pub use entry::{entry_key, parse_entry_key, Action, ActionType, DataType, WalEntry, WAL_PREFIX};

/// Coordination lock guarding the single WAL writer
pub const WRITER_LOCK_KEY: &str = "configstore/wal/writer";

const SESSION_OWNER: &str = "configstore-wal";

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("coordination: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("store: {0}")]
    Storage(#[from] StorageError),

    #[error("entry encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("writer lock {0} is held by another session")]
    WriterLockHeld(String),

    #[error("coordination session lost: {0}")]
    SessionLost(#[source] CoordinationError),

    #[error("wal is not accepting appends: session lost")]
    Fenced,

    #[error("refusing to append an entry without actions")]
    EmptyEntry,

    #[error("wal entry {0} is missing or corrupted")]
    Corrupted(u64),
}

/// Result type for WAL operations
pub type WalResult<T> = Result<T, WalError>;

/// Append-only log persisted in the long-term store
#[derive(Debug)]
pub struct WalManager {
    lts: Arc<dyn ObjectStorage>,
    coordination: Arc<dyn CoordinationClient>,
    session: Session,
    config: WalConfig,
    /// Serializes appends; holds the last committed sequence
    append_lock: Mutex<u64>,
    committed_tx: watch::Sender<u64>,
    fenced: AtomicBool,
}

impl WalManager {
    /// Open the log: take the writer lock and recover the last sequence
    pub async fn new(
        coordination: Arc<dyn CoordinationClient>,
        lts: Arc<dyn ObjectStorage>,
        config: WalConfig,
    ) -> WalResult<Self> {
        let session = coordination
            .open_session(SESSION_OWNER, config.session_ttl())
            .await?;
        if !coordination.try_lock(WRITER_LOCK_KEY, &session).await? {
            let _ = coordination.close_session(&session).await;
            return Err(WalError::WriterLockHeld(WRITER_LOCK_KEY.to_string()));
        }

        let last_sequence = match recover_last_sequence(lts.as_ref()).await {
            Ok(sequence) => sequence,
            Err(e) => {
                let _ = coordination.close_session(&session).await;
                return Err(e);
            }
        };
        tracing::info!(last_sequence, session = %session.id, "wal opened");

        let (committed_tx, _) = watch::channel(last_sequence);
        Ok(Self {
            lts,
            coordination,
            session,
            config,
            append_lock: Mutex::new(last_sequence),
            committed_tx,
            fenced: AtomicBool::new(false),
        })
    }

    /// Sequence of the last durable entry (0 when the log is empty)
    pub fn last_sequence(&self) -> u64 {
        *self.committed_tx.borrow()
    }

    /// Receive the last committed sequence whenever it advances
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.committed_tx.subscribe()
    }

    /// Coordination session held by this writer
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Durably append an entry
    ///
    /// Returns only after the entry is stored in the long-term store. Appends
    /// are totally ordered by sequence.
    pub async fn append(&self, actions: Vec<Action>) -> WalResult<WalEntry> {
        if actions.is_empty() {
            return Err(WalError::EmptyEntry);
        }

        let mut last = self.append_lock.lock().await;
        if self.fenced.load(Ordering::Acquire) {
            return Err(WalError::Fenced);
        }

        let entry = WalEntry {
            sequence: *last + 1,
            timestamp: chrono::Utc::now().timestamp_millis(),
            actions,
        };
        self.lts
            .put(&entry_key(entry.sequence), entry.to_bytes()?)
            .await?;

        *last = entry.sequence;
        self.committed_tx.send_replace(entry.sequence);
        tracing::debug!(
            sequence = entry.sequence,
            actions = entry.actions.len(),
            "wal entry committed"
        );
        Ok(entry)
    }

    /// Committed entries with a sequence greater than `after`, in order
    pub async fn entries_after(&self, after: u64) -> WalResult<Vec<WalEntry>> {
        let head = self.last_sequence();
        let mut entries = Vec::new();
        for sequence in (after + 1)..=head {
            let data = match self.lts.get(&entry_key(sequence)).await {
                Ok(data) => data,
                Err(StorageError::NotFound(_)) => return Err(WalError::Corrupted(sequence)),
                Err(e) => return Err(e.into()),
            };
            let entry = WalEntry::from_bytes(&data)?;
            if entry.sequence != sequence {
                return Err(WalError::Corrupted(sequence));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Keep the coordination session alive until cancelled
    ///
    /// Returns `Ok` on cancellation and an error once the session is lost;
    /// from then on appends are rejected.
    pub async fn run(&self, cancel: CancellationToken) -> WalResult<()> {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("wal exiting");
                    let _ = self.coordination.unlock(WRITER_LOCK_KEY, &self.session).await;
                    let _ = self.coordination.close_session(&self.session).await;
                    return Ok(());
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = self.coordination.keep_alive(&self.session).await {
                        self.fenced.store(true, Ordering::Release);
                        tracing::error!(error = %e, "wal coordination session lost");
                        return Err(WalError::SessionLost(e));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Subsystem for WalManager {
    fn name(&self) -> &'static str {
        "wal"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), BoxError> {
        WalManager::run(self, cancel).await.map_err(Into::into)
    }
}

/// Highest sequence in the store, checking there are no gaps
async fn recover_last_sequence(lts: &dyn ObjectStorage) -> WalResult<u64> {
    let mut last = 0;
    for key in lts.list(WAL_PREFIX).await? {
        let Some(sequence) = parse_entry_key(&key) else {
            tracing::warn!(key = %key, "ignoring unexpected object in wal prefix");
            continue;
        };
        if sequence != last + 1 {
            return Err(WalError::Corrupted(last + 1));
        }
        last = sequence;
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::coordination::EmbeddedCoordination;
    use crate::objectstorage::MemoryStorage;
    use crate::types::Project;

    fn fast_config() -> WalConfig {
        WalConfig {
            heartbeat_interval_ms: 10,
            session_ttl_ms: 1000,
        }
    }

    fn put_project(name: &str) -> Action {
        let project = Project::new(format!("id-{}", name), name.to_string());
        Action::put(DataType::Project, &project.id, &project).unwrap()
    }

    async fn open(
        coordination: Arc<EmbeddedCoordination>,
        lts: Arc<MemoryStorage>,
    ) -> WalResult<WalManager> {
        WalManager::new(coordination, lts, fast_config()).await
    }

    #[tokio::test]
    async fn test_append_assigns_contiguous_sequences() {
        let lts = Arc::new(MemoryStorage::new());
        let wal = open(Arc::new(EmbeddedCoordination::new()), lts.clone())
            .await
            .unwrap();

        let first = wal.append(vec![put_project("a")]).await.unwrap();
        let second = wal.append(vec![put_project("b")]).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(wal.last_sequence(), 2);
        assert_eq!(lts.len(), 2);

        let entries = wal.entries_after(1).await.unwrap();
        assert_eq!(entries, vec![second]);
    }

    #[tokio::test]
    async fn test_reopen_recovers_sequence() {
        let coordination = Arc::new(EmbeddedCoordination::new());
        let lts = Arc::new(MemoryStorage::new());
        {
            let wal = open(coordination.clone(), lts.clone()).await.unwrap();
            wal.append(vec![put_project("a")]).await.unwrap();
            wal.append(vec![put_project("b")]).await.unwrap();
            coordination.close_session(wal.session()).await.unwrap();
        }

        let wal = open(coordination, lts).await.unwrap();
        assert_eq!(wal.last_sequence(), 2);
        assert_eq!(wal.append(vec![put_project("c")]).await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_second_writer_is_rejected() {
        let coordination = Arc::new(EmbeddedCoordination::new());
        let lts = Arc::new(MemoryStorage::new());
        let _first = open(coordination.clone(), lts.clone()).await.unwrap();

        let second = open(coordination, lts).await;
        assert!(matches!(second, Err(WalError::WriterLockHeld(_))));
    }

    #[tokio::test]
    async fn test_recovery_detects_gap() {
        let lts = Arc::new(MemoryStorage::new());
        lts.put(&entry_key(2), b"{}".to_vec()).await.unwrap();

        let result = open(Arc::new(EmbeddedCoordination::new()), lts).await;
        assert!(matches!(result, Err(WalError::Corrupted(1))));
    }

    #[tokio::test]
    async fn test_empty_entry_rejected() {
        let wal = open(
            Arc::new(EmbeddedCoordination::new()),
            Arc::new(MemoryStorage::new()),
        )
        .await
        .unwrap();
        assert!(matches!(wal.append(vec![]).await, Err(WalError::EmptyEntry)));
    }

    #[tokio::test]
    async fn test_run_returns_ok_on_cancel() {
        let coordination = Arc::new(EmbeddedCoordination::new());
        let wal = open(coordination.clone(), Arc::new(MemoryStorage::new()))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        wal.run(cancel).await.unwrap();
        assert_eq!(coordination.lock_holder(WRITER_LOCK_KEY), None);
    }

    #[tokio::test]
    async fn test_run_fails_and_fences_on_session_loss() {
        let coordination = Arc::new(EmbeddedCoordination::new());
        let wal = open(coordination.clone(), Arc::new(MemoryStorage::new()))
            .await
            .unwrap();
        coordination.expire_session(&wal.session().id);

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            wal.run(CancellationToken::new()),
        )
        .await
        .expect("run should terminate");
        assert!(matches!(outcome, Err(WalError::SessionLost(_))));
        assert!(matches!(
            wal.append(vec![put_project("late")]).await,
            Err(WalError::Fenced)
        ));
    }

    #[tokio::test]
    async fn test_subscribe_sees_commits() {
        let wal = open(
            Arc::new(EmbeddedCoordination::new()),
            Arc::new(MemoryStorage::new()),
        )
        .await
        .unwrap();
        let mut rx = wal.subscribe();

        wal.append(vec![put_project("a")]).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
