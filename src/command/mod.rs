//! Command executor
//!
//! Every mutation goes through [`CommandHandler`]. Commands are serialized:
//! each one catches the read model up to the WAL head, validates against it,
//! builds the complete new record and appends it. A command only returns
//! after its WAL entry is durable in the long-term store.

mod requests;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::BoxError;
use crate::readdb::{ReadDb, ReadDbError};
use crate::types::{is_valid_name, LinkedAccount, Project, RemoteSource, RemoteSourceAuthType, User};
use crate::wal::{Action, DataType, WalError, WalManager};

pub use requests::{
    CreateProjectRequest, CreateRemoteSourceRequest, CreateUserLaRequest, CreateUserRequest,
    CreateUserTokenRequest, UpdateUserLaRequest,
};

/// Why a command was rejected
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    /// The WAL or the read model failed; the command had no effect unless the
    /// append itself was acknowledged
    #[error("store unavailable: {0}")]
    Unavailable(#[source] BoxError),
}

impl From<WalError> for CommandError {
    fn from(e: WalError) -> Self {
        CommandError::Unavailable(Box::new(e))
    }
}

impl From<ReadDbError> for CommandError {
    fn from(e: ReadDbError) -> Self {
        CommandError::Unavailable(Box::new(e))
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Unavailable(Box::new(e))
    }
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Value produced by a command, with the WAL sequence that made it durable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Committed<T> {
    pub value: T,
    pub sequence: u64,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn check_name(kind: &str, name: &str) -> CommandResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(CommandError::InvalidArgument(format!(
            "invalid {} name {:?}",
            kind, name
        )))
    }
}

/// Serialized writer on top of the WAL
#[derive(Debug)]
pub struct CommandHandler {
    readdb: Arc<ReadDb>,
    wal: Arc<WalManager>,
    lock: Mutex<()>,
}

impl CommandHandler {
    pub fn new(readdb: Arc<ReadDb>, wal: Arc<WalManager>) -> Self {
        Self {
            readdb,
            wal,
            lock: Mutex::new(()),
        }
    }

    /// Append one action and make its value visible to the caller
    async fn commit<T>(&self, action: Action, value: T) -> CommandResult<Committed<T>> {
        let entry = self.wal.append(vec![action]).await?;
        Ok(Committed {
            value,
            sequence: entry.sequence,
        })
    }

    async fn user_named(&self, user_name: &str) -> CommandResult<User> {
        self.readdb
            .user_by_name(user_name)
            .await
            .value
            .ok_or_else(|| CommandError::NotFound(format!("user {:?} doesn't exist", user_name)))
    }

    pub async fn create_project(
        &self,
        req: CreateProjectRequest,
    ) -> CommandResult<Committed<Project>> {
        check_name("project", &req.name)?;

        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        if self.readdb.project_by_name(&req.name).await.value.is_some() {
            return Err(CommandError::AlreadyExists(format!(
                "project {:?} already exists",
                req.name
            )));
        }
        if let Some(la_id) = req.linked_account_id.as_deref() {
            if self.readdb.user_by_linked_account(la_id).await.value.is_none() {
                return Err(CommandError::InvalidArgument(format!(
                    "linked account {:?} doesn't exist",
                    la_id
                )));
            }
        }

        let project = Project {
            id: new_id(),
            name: req.name,
            linked_account_id: req.linked_account_id,
            repo_path: req.repo_path,
            clone_url: req.clone_url,
            skip_ssh_host_key_check: req.skip_ssh_host_key_check,
        };
        let action = Action::put(DataType::Project, &project.id, &project)?;
        let committed = self.commit(action, project).await?;
        tracing::info!(project = %committed.value.name, sequence = committed.sequence, "project created");
        Ok(committed)
    }

    pub async fn delete_project(&self, name: &str) -> CommandResult<Committed<()>> {
        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let project = self
            .readdb
            .project_by_name(name)
            .await
            .value
            .ok_or_else(|| CommandError::NotFound(format!("project {:?} doesn't exist", name)))?;

        let committed = self
            .commit(Action::delete(DataType::Project, &project.id), ())
            .await?;
        tracing::info!(project = %name, sequence = committed.sequence, "project deleted");
        Ok(committed)
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> CommandResult<Committed<User>> {
        check_name("user", &req.user_name)?;

        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        if self.readdb.user_by_name(&req.user_name).await.value.is_some() {
            return Err(CommandError::AlreadyExists(format!(
                "user {:?} already exists",
                req.user_name
            )));
        }

        let mut user = User::new(new_id(), req.user_name);
        if let Some(la_req) = req.linked_account {
            let la = self.build_linked_account(la_req).await?;
            user.linked_accounts.insert(la.id.clone(), la);
        }

        let action = Action::put(DataType::User, &user.id, &user)?;
        let committed = self.commit(action, user).await?;
        tracing::info!(user = %committed.value.user_name, sequence = committed.sequence, "user created");
        Ok(committed)
    }

    pub async fn delete_user(&self, user_name: &str) -> CommandResult<Committed<()>> {
        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let user = self.user_named(user_name).await?;
        let committed = self
            .commit(Action::delete(DataType::User, &user.id), ())
            .await?;
        tracing::info!(user = %user_name, sequence = committed.sequence, "user deleted");
        Ok(committed)
    }

    /// A remote user is linked to at most one local user
    ///
    /// `updating` names the linked account being rewritten, which may keep
    /// its own remote user.
    async fn check_remote_user_free(
        &self,
        remote_user_id: &str,
        rs: &RemoteSource,
        updating: Option<&str>,
    ) -> CommandResult<()> {
        let owner = self
            .readdb
            .user_by_remote_user(remote_user_id, &rs.id)
            .await
            .value;
        let Some(owner) = owner else {
            return Ok(());
        };
        let taken = owner.linked_accounts.values().any(|la| {
            Some(la.id.as_str()) != updating
                && la.remote_user_id == remote_user_id
                && la.remote_source_id == rs.id
        });
        if taken {
            return Err(CommandError::AlreadyExists(format!(
                "remote user {:?} on {:?} is already linked to user {:?}",
                remote_user_id, rs.name, owner.user_name
            )));
        }
        Ok(())
    }

    /// Validate a link request against the current read model
    async fn build_linked_account(&self, req: CreateUserLaRequest) -> CommandResult<LinkedAccount> {
        if req.remote_user_id.is_empty() {
            return Err(CommandError::InvalidArgument(
                "empty remote user id".to_string(),
            ));
        }
        let rs = self
            .readdb
            .remote_source_by_name(&req.remote_source_name)
            .await
            .value
            .ok_or_else(|| {
                CommandError::InvalidArgument(format!(
                    "remote source {:?} doesn't exist",
                    req.remote_source_name
                ))
            })?;
        self.check_remote_user_free(&req.remote_user_id, &rs, None)
            .await?;

        Ok(LinkedAccount {
            id: new_id(),
            remote_source_id: rs.id,
            remote_user_id: req.remote_user_id,
            remote_user_name: req.remote_user_name,
            user_access_token: req.user_access_token,
            oauth2_access_token: req.oauth2_access_token,
            oauth2_refresh_token: req.oauth2_refresh_token,
        })
    }

    pub async fn create_user_la(
        &self,
        user_name: &str,
        req: CreateUserLaRequest,
    ) -> CommandResult<Committed<LinkedAccount>> {
        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let mut user = self.user_named(user_name).await?;
        let la = self.build_linked_account(req).await?;
        user.linked_accounts.insert(la.id.clone(), la.clone());

        let action = Action::put(DataType::User, &user.id, &user)?;
        let committed = self.commit(action, la).await?;
        tracing::info!(user = %user_name, la = %committed.value.id, sequence = committed.sequence, "linked account created");
        Ok(committed)
    }

    pub async fn update_user_la(
        &self,
        user_name: &str,
        la_id: &str,
        req: UpdateUserLaRequest,
    ) -> CommandResult<Committed<LinkedAccount>> {
        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let mut user = self.user_named(user_name).await?;
        let la = user.linked_accounts.get_mut(la_id).ok_or_else(|| {
            CommandError::NotFound(format!(
                "linked account {:?} of user {:?} doesn't exist",
                la_id, user_name
            ))
        })?;

        if let Some(remote_user_id) = req.remote_user_id {
            if remote_user_id.is_empty() {
                return Err(CommandError::InvalidArgument(
                    "empty remote user id".to_string(),
                ));
            }
            if remote_user_id != la.remote_user_id {
                let rs = self
                    .readdb
                    .remote_source(&la.remote_source_id)
                    .await
                    .value
                    .ok_or_else(|| {
                        CommandError::InvalidArgument(format!(
                            "remote source {:?} of linked account {:?} doesn't exist",
                            la.remote_source_id, la_id
                        ))
                    })?;
                self.check_remote_user_free(&remote_user_id, &rs, Some(la_id))
                    .await?;
            }
            la.remote_user_id = remote_user_id;
        }
        if let Some(v) = req.remote_user_name {
            la.remote_user_name = v;
        }
        if let Some(v) = req.user_access_token {
            la.user_access_token = v;
        }
        if let Some(v) = req.oauth2_access_token {
            la.oauth2_access_token = v;
        }
        if let Some(v) = req.oauth2_refresh_token {
            la.oauth2_refresh_token = v;
        }
        let la = la.clone();

        let action = Action::put(DataType::User, &user.id, &user)?;
        let committed = self.commit(action, la).await?;
        tracing::info!(user = %user_name, la = %la_id, sequence = committed.sequence, "linked account updated");
        Ok(committed)
    }

    pub async fn delete_user_la(&self, user_name: &str, la_id: &str) -> CommandResult<Committed<()>> {
        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let mut user = self.user_named(user_name).await?;
        if user.linked_accounts.remove(la_id).is_none() {
            return Err(CommandError::NotFound(format!(
                "linked account {:?} of user {:?} doesn't exist",
                la_id, user_name
            )));
        }

        let action = Action::put(DataType::User, &user.id, &user)?;
        let committed = self.commit(action, ()).await?;
        tracing::info!(user = %user_name, la = %la_id, sequence = committed.sequence, "linked account deleted");
        Ok(committed)
    }

    /// Create a named token for the user; returns the token value
    pub async fn create_user_token(
        &self,
        user_name: &str,
        token_name: &str,
    ) -> CommandResult<Committed<String>> {
        if token_name.is_empty() {
            return Err(CommandError::InvalidArgument("empty token name".to_string()));
        }

        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let mut user = self.user_named(user_name).await?;
        if user.tokens.contains_key(token_name) {
            return Err(CommandError::AlreadyExists(format!(
                "token {:?} for user {:?} already exists",
                token_name, user_name
            )));
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        user.tokens.insert(token_name.to_string(), token.clone());

        let action = Action::put(DataType::User, &user.id, &user)?;
        let committed = self.commit(action, token).await?;
        tracing::info!(user = %user_name, token = %token_name, sequence = committed.sequence, "user token created");
        Ok(committed)
    }

    pub async fn create_remote_source(
        &self,
        req: CreateRemoteSourceRequest,
    ) -> CommandResult<Committed<RemoteSource>> {
        check_name("remote source", &req.name)?;
        if req.api_url.is_empty() {
            return Err(CommandError::InvalidArgument("empty remote source api url".to_string()));
        }
        if req.auth_type == RemoteSourceAuthType::Oauth2
            && (req.oauth2_client_id.is_empty() || req.oauth2_client_secret.is_empty())
        {
            return Err(CommandError::InvalidArgument(
                "oauth2 remote sources need a client id and secret".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        if self.readdb.remote_source_by_name(&req.name).await.value.is_some() {
            return Err(CommandError::AlreadyExists(format!(
                "remote source {:?} already exists",
                req.name
            )));
        }

        let rs = RemoteSource {
            id: new_id(),
            name: req.name,
            api_url: req.api_url,
            source_type: req.source_type,
            auth_type: req.auth_type,
            oauth2_client_id: req.oauth2_client_id,
            oauth2_client_secret: req.oauth2_client_secret,
            skip_verify: req.skip_verify,
        };
        let action = Action::put(DataType::RemoteSource, &rs.id, &rs)?;
        let committed = self.commit(action, rs).await?;
        tracing::info!(remote_source = %committed.value.name, sequence = committed.sequence, "remote source created");
        Ok(committed)
    }

    pub async fn delete_remote_source(&self, name: &str) -> CommandResult<Committed<()>> {
        let _guard = self.lock.lock().await;
        self.readdb.sync().await?;

        let rs = self.readdb.remote_source_by_name(name).await.value.ok_or_else(|| {
            CommandError::NotFound(format!("remote source {:?} doesn't exist", name))
        })?;

        let committed = self
            .commit(Action::delete(DataType::RemoteSource, &rs.id), ())
            .await?;
        tracing::info!(remote_source = %name, sequence = committed.sequence, "remote source deleted");
        Ok(committed)
    }
}
