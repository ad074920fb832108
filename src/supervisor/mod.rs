//! Service supervisor
//!
//! Lifecycle:
//! - Start order: long-term store → coordination → WAL → read model →
//!   command executor → route table → listener
//! - Run: WAL, read model and listener run as independent tasks; the first
//!   terminal outcome (or external cancellation) decides the result
//!
//! The supervisor does not join the remaining tasks before returning. They
//! observe the same cancellation token, or are torn down with the process.

mod task;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::{self, ApiState, Listener, RouteTable};
use crate::command::CommandHandler;
use crate::config::ConfigStoreConfig;
use crate::coordination::{self, CoordinationClient};
use crate::error::{BoxError, ConfigStoreError, ConfigStoreResult};
use crate::objectstorage::{self, ObjectStorage};
use crate::readdb::ReadDb;
use crate::wal::WalManager;

pub use task::{TaskExit, TaskSet};

/// A long-running component supervised for its whole lifetime
///
/// `run` only returns when the component stops: `Ok` after observing
/// cancellation, `Err` on failure.
#[async_trait]
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, cancel: CancellationToken) -> Result<(), BoxError>;
}

/// Everything built by [`construct`]
#[derive(Debug)]
pub struct ServiceHandles {
    pub lts: Arc<dyn ObjectStorage>,
    pub coordination: Arc<dyn CoordinationClient>,
    pub wal: Arc<WalManager>,
    pub readdb: Arc<ReadDb>,
    pub commands: Arc<CommandHandler>,
    pub routes: RouteTable,
    pub listener: Listener,
}

/// Build every collaborator in dependency order
///
/// Fails on the first collaborator that cannot be built. Nothing is running
/// when this returns.
pub async fn construct(config: &ConfigStoreConfig) -> ConfigStoreResult<ServiceHandles> {
    config.validate()?;

    let lts = objectstorage::new_lts(&config.lts)?;
    tracing::debug!(lts = ?config.lts, "long-term store ready");

    let coordination = coordination::connect(&config.coordination).await?;
    tracing::debug!("coordination client ready");

    let wal = Arc::new(WalManager::new(coordination.clone(), lts.clone(), config.wal.clone()).await?);
    let readdb = Arc::new(ReadDb::new(wal.clone(), config.readdb.clone()));
    let commands = Arc::new(CommandHandler::new(readdb.clone(), wal.clone()));

    let routes = RouteTable::configstore()?;
    let router = api::router(
        ApiState {
            commands: commands.clone(),
            readdb: readdb.clone(),
        },
        &routes,
    );
    let listener = Listener::new(&config.web, router).await?;

    tracing::info!(
        listen_address = %config.web.listen_address,
        tls = listener.is_tls(),
        routes = routes.len(),
        "configstore constructed"
    );

    Ok(ServiceHandles {
        lts,
        coordination,
        wal,
        readdb,
        commands,
        routes,
        listener,
    })
}

/// Run the service until cancellation or the first failure
pub async fn run(handles: ServiceHandles, cancel: CancellationToken) -> ConfigStoreResult<()> {
    let subsystems: Vec<Arc<dyn Subsystem>> = vec![
        handles.wal as Arc<dyn Subsystem>,
        handles.readdb as Arc<dyn Subsystem>,
    ];
    supervise(subsystems, handles.listener, cancel).await
}

/// Run `subsystems` and `listener` concurrently; the first terminal outcome wins
///
/// - cancellation: the listener is asked to close, returns `Ok(())`
/// - listener stopped: `ConfigStoreError::Listener`
/// - subsystem stopped: `SubsystemFailed` or `SubsystemExited`
pub async fn supervise(
    subsystems: Vec<Arc<dyn Subsystem>>,
    listener: Listener,
    cancel: CancellationToken,
) -> ConfigStoreResult<()> {
    let mut tasks = TaskSet::new();
    for subsystem in subsystems {
        let name = subsystem.name();
        let cancel = cancel.clone();
        tasks.spawn(
            name,
            async move { subsystem.run(cancel).await }
                .instrument(tracing::info_span!("subsystem", name)),
        );
    }

    let close = listener.close_token();
    let mut listener_task =
        tokio::spawn(listener.serve().instrument(tracing::info_span!("listener")));

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            tracing::info!("cancellation received, closing listener");
            close.cancel();
            Ok(())
        }

        outcome = &mut listener_task => {
            let err = match outcome {
                Ok(Err(e)) => e,
                Ok(Ok(())) => io::Error::new(io::ErrorKind::Other, "http listener stopped"),
                Err(join) => io::Error::new(io::ErrorKind::Other, join.to_string()),
            };
            tracing::error!(error = %err, "http server listen error");
            Err(ConfigStoreError::Listener(err))
        }

        Some(exit) = tasks.next_terminal() => {
            let name = exit.name;
            match exit.outcome {
                Ok(Ok(())) => {
                    tracing::error!(subsystem = name, "subsystem exited unexpectedly");
                    Err(ConfigStoreError::SubsystemExited { name })
                }
                Ok(Err(source)) => {
                    tracing::error!(subsystem = name, error = %source, "subsystem failed");
                    Err(ConfigStoreError::SubsystemFailed { name, source })
                }
                Err(join) => {
                    tracing::error!(subsystem = name, error = %join, "subsystem task aborted");
                    Err(ConfigStoreError::SubsystemFailed { name, source: Box::new(join) })
                }
            }
        }
    }
}
